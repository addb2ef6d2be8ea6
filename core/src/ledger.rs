//! Stock ledger: the `total >= locked + sold` invariant per SKU.
//!
//! [`StockCounters`] holds the pure arithmetic. [`StockLedger`] applies it to a stored
//! SKU as one read-modify-write under the SKU's row lock, so two concurrent reservations
//! against the same SKU serialize and can never jointly exceed `total - sold`.
//!
//! The `*_in` functions run the same operations inside a caller's unit of work; the
//! fulfillment orchestrator uses them to commit stock and record the delivery atomically.

use crate::environment::Clock;
use crate::error::{FulfillmentError, Result};
use crate::metrics::FulfillmentMetrics;
use crate::store::{Store, StockRepository, UnitOfWork};
use crate::types::SkuId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three manual-stock counters of a SKU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockCounters {
    /// Units ever made available
    pub total: u32,
    /// Units reserved by unpaid orders
    pub locked: u32,
    /// Units sold
    pub sold: u32,
}

impl StockCounters {
    /// Build counters without checking the invariant (e.g. when loading legacy rows).
    #[must_use]
    pub const fn new(total: u32, locked: u32, sold: u32) -> Self {
        Self {
            total,
            locked,
            sold,
        }
    }

    /// Counters with nothing locked or sold.
    #[must_use]
    pub const fn with_total(total: u32) -> Self {
        Self::new(total, 0, 0)
    }

    /// Units bound to orders, `locked + sold`, widened so it cannot overflow.
    #[must_use]
    pub const fn committed(&self) -> u64 {
        self.locked as u64 + self.sold as u64
    }

    /// Whether `total >= locked + sold`.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.total as u64 >= self.committed()
    }

    /// `total - locked - sold`, or zero for inconsistent legacy data.
    #[must_use]
    pub fn available(&self) -> u32 {
        u32::try_from((self.total as u64).saturating_sub(self.committed())).unwrap_or(u32::MAX)
    }

    /// Lock `qty` units for an unpaid order.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InsufficientStock`] when fewer than `qty` units are
    /// available.
    pub fn reserve(self, sku_id: SkuId, qty: u32) -> Result<Self> {
        let available = self.available();
        if !self.is_consistent() || available < qty {
            return Err(FulfillmentError::InsufficientStock {
                sku_id,
                requested: qty,
                available,
            });
        }
        Ok(Self {
            locked: self.locked + qty,
            ..self
        })
    }

    /// Move `qty` locked units to sold.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when fewer than `qty` units are locked.
    pub fn commit(self, sku_id: SkuId, qty: u32) -> Result<Self> {
        let locked = self.locked_minus(sku_id, qty, "commit")?;
        let sold = self.sold.checked_add(qty).ok_or_else(|| {
            FulfillmentError::InvalidState(format!("SKU {sku_id}: sold counter overflow"))
        })?;
        Ok(Self {
            locked,
            sold,
            ..self
        })
    }

    /// Return `qty` locked units to the available pool.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when fewer than `qty` units are locked.
    pub fn release(self, sku_id: SkuId, qty: u32) -> Result<Self> {
        let locked = self.locked_minus(sku_id, qty, "release")?;
        Ok(Self { locked, ..self })
    }

    /// Change the total.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when `new_total < locked + sold`.
    pub fn resize(self, sku_id: SkuId, new_total: u32) -> Result<Self> {
        if u64::from(new_total) < self.committed() {
            return Err(FulfillmentError::InvalidState(format!(
                "SKU {sku_id}: total {new_total} below locked {} + sold {}",
                self.locked, self.sold
            )));
        }
        Ok(Self {
            total: new_total,
            ..self
        })
    }

    fn locked_minus(self, sku_id: SkuId, qty: u32, op: &str) -> Result<u32> {
        self.locked.checked_sub(qty).ok_or_else(|| {
            FulfillmentError::InvalidState(format!(
                "SKU {sku_id}: cannot {op} {qty} units, only {} locked",
                self.locked
            ))
        })
    }
}

/// Atomic counter operations against stored SKUs.
pub struct StockLedger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Store> StockLedger<S> {
    /// Create a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Lock `qty` units of a SKU.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InsufficientStock`] when the SKU cannot cover `qty`,
    /// [`FulfillmentError::InvalidQuantity`] for zero.
    #[tracing::instrument(skip(self), err)]
    pub async fn reserve(&self, sku_id: SkuId, qty: u32) -> Result<StockCounters> {
        let mut tx = self.store.begin().await?;
        let outcome = reserve_in(&mut tx, self.clock.as_ref(), sku_id, qty).await;
        FulfillmentMetrics::record_reservation(outcome.is_ok());
        let counters = outcome?;
        tx.commit().await?;
        Ok(counters)
    }

    /// Convert `qty` locked units to sold.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when fewer than `qty` units are locked.
    #[tracing::instrument(skip(self), err)]
    pub async fn commit(&self, sku_id: SkuId, qty: u32) -> Result<StockCounters> {
        let mut tx = self.store.begin().await?;
        let counters = commit_in(&mut tx, self.clock.as_ref(), sku_id, qty).await?;
        tx.commit().await?;
        Ok(counters)
    }

    /// Return `qty` locked units, e.g. when an order is cancelled before payment.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when fewer than `qty` units are locked.
    #[tracing::instrument(skip(self), err)]
    pub async fn release(&self, sku_id: SkuId, qty: u32) -> Result<StockCounters> {
        let mut tx = self.store.begin().await?;
        let counters = release_in(&mut tx, self.clock.as_ref(), sku_id, qty).await?;
        tx.commit().await?;
        Ok(counters)
    }

    /// Set a new total.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] when `new_total < locked + sold`.
    #[tracing::instrument(skip(self), err)]
    pub async fn resize(&self, sku_id: SkuId, new_total: u32) -> Result<StockCounters> {
        let mut tx = self.store.begin().await?;
        let counters = mutate_in(&mut tx, self.clock.as_ref(), sku_id, |c| {
            c.resize(sku_id, new_total)
        })
        .await?;
        tx.commit().await?;
        tracing::info!(sku_id = %sku_id, total = counters.total, "Stock total resized");
        Ok(counters)
    }

    /// Current counters of a SKU.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] if the SKU does not exist.
    pub async fn counters(&self, sku_id: SkuId) -> Result<StockCounters> {
        let mut tx = self.store.begin().await?;
        let counters = locked_counters(&mut tx, sku_id).await?;
        tx.commit().await?;
        Ok(counters)
    }
}

/// [`StockLedger::reserve`] inside an open unit of work.
///
/// # Errors
///
/// See [`StockLedger::reserve`].
pub async fn reserve_in<U: UnitOfWork>(
    tx: &mut U,
    clock: &dyn Clock,
    sku_id: SkuId,
    qty: u32,
) -> Result<StockCounters> {
    ensure_positive(qty)?;
    mutate_in(tx, clock, sku_id, |c| c.reserve(sku_id, qty)).await
}

/// [`StockLedger::commit`] inside an open unit of work.
///
/// # Errors
///
/// See [`StockLedger::commit`].
pub async fn commit_in<U: UnitOfWork>(
    tx: &mut U,
    clock: &dyn Clock,
    sku_id: SkuId,
    qty: u32,
) -> Result<StockCounters> {
    ensure_positive(qty)?;
    mutate_in(tx, clock, sku_id, |c| c.commit(sku_id, qty)).await
}

/// [`StockLedger::release`] inside an open unit of work.
///
/// # Errors
///
/// See [`StockLedger::release`].
pub async fn release_in<U: UnitOfWork>(
    tx: &mut U,
    clock: &dyn Clock,
    sku_id: SkuId,
    qty: u32,
) -> Result<StockCounters> {
    ensure_positive(qty)?;
    mutate_in(tx, clock, sku_id, |c| c.release(sku_id, qty)).await
}

const fn ensure_positive(qty: u32) -> Result<()> {
    if qty == 0 {
        return Err(FulfillmentError::InvalidQuantity);
    }
    Ok(())
}

async fn locked_counters<U: StockRepository>(tx: &mut U, sku_id: SkuId) -> Result<StockCounters> {
    tx.lock_stock(sku_id)
        .await?
        .ok_or_else(|| FulfillmentError::InvalidState(format!("SKU {sku_id} not found")))
}

async fn mutate_in<U, F>(
    tx: &mut U,
    clock: &dyn Clock,
    sku_id: SkuId,
    apply: F,
) -> Result<StockCounters>
where
    U: StockRepository,
    F: FnOnce(StockCounters) -> Result<StockCounters> + Send,
{
    let current = locked_counters(tx, sku_id).await?;
    let next = apply(current)?;
    tx.store_stock(sku_id, next, clock.now()).await?;
    tracing::debug!(
        sku_id = %sku_id,
        total = next.total,
        locked = next.locked,
        sold = next.sold,
        "Stock counters updated"
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SKU: SkuId = SkuId::new(7);

    #[test]
    fn reserve_until_exhausted() {
        let counters = StockCounters::new(20, 3, 5);
        assert_eq!(counters.available(), 12);

        let counters = counters.reserve(SKU, 12).unwrap_or_default();
        assert_eq!(counters, StockCounters::new(20, 15, 5));
        assert_eq!(counters.available(), 0);

        assert_eq!(
            counters.reserve(SKU, 1),
            Err(FulfillmentError::InsufficientStock {
                sku_id: SKU,
                requested: 1,
                available: 0,
            })
        );
    }

    #[test]
    fn commit_moves_locked_to_sold() {
        let counters = StockCounters::new(10, 4, 1);
        assert_eq!(counters.commit(SKU, 3), Ok(StockCounters::new(10, 1, 4)));
        assert!(matches!(
            counters.commit(SKU, 5),
            Err(FulfillmentError::InvalidState(_))
        ));
    }

    #[test]
    fn release_returns_units() {
        let counters = StockCounters::new(10, 4, 1);
        assert_eq!(counters.release(SKU, 4), Ok(StockCounters::new(10, 0, 1)));
        assert!(counters.release(SKU, 5).is_err());
    }

    #[test]
    fn resize_cannot_drop_below_committed() {
        let counters = StockCounters::new(10, 4, 1);
        assert_eq!(counters.resize(SKU, 5), Ok(StockCounters::new(5, 4, 1)));
        assert!(matches!(
            counters.resize(SKU, 4),
            Err(FulfillmentError::InvalidState(_))
        ));
    }

    #[test]
    fn inconsistent_legacy_counters_have_nothing_available() {
        let counters = StockCounters::new(2, 2, 1);
        assert!(!counters.is_consistent());
        assert_eq!(counters.available(), 0);
        assert!(counters.reserve(SKU, 1).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u32),
        Commit(u32),
        Release(u32),
        Resize(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..8).prop_map(Op::Reserve),
            (0u32..8).prop_map(Op::Commit),
            (0u32..8).prop_map(Op::Release),
            (0u32..40).prop_map(Op::Resize),
        ]
    }

    proptest! {
        #[test]
        fn any_sequence_preserves_invariant(total in 0u32..40, ops in prop::collection::vec(op(), 0..60)) {
            let mut counters = StockCounters::with_total(total);
            for op in ops {
                let next = match op {
                    Op::Reserve(q) => counters.reserve(SKU, q),
                    Op::Commit(q) => counters.commit(SKU, q),
                    Op::Release(q) => counters.release(SKU, q),
                    Op::Resize(t) => counters.resize(SKU, t),
                };
                if let Ok(next) = next {
                    counters = next;
                }
                prop_assert!(counters.is_consistent());
                prop_assert_eq!(
                    u64::from(counters.available()) + counters.committed(),
                    u64::from(counters.total)
                );
            }
        }
    }
}
