//! Fulfillment orchestrator.
//!
//! [`FulfillmentService::create_auto`] turns a paid order into one [`Fulfillment`] per
//! order item. Each item runs in its own unit of work that starts by locking the order
//! row, so concurrent completions of the same order serialize and the second one finds
//! the first one's fulfillments instead of allocating again.
//!
//! When an item fails, only that item's unit of work is rolled back: its claimed secrets
//! return to `available` and its stock commit is undone. Items fulfilled before it stay
//! fulfilled, and calling `create_auto` again resumes with the remaining items.

use crate::environment::Clock;
use crate::error::{FulfillmentError, Result};
use crate::ledger::{commit_in, release_in, reserve_in};
use crate::metrics::FulfillmentMetrics;
use crate::resolver::resolve_in;
use crate::retry::RetryPolicy;
use crate::secrets::allocate_in;
use crate::store::{CatalogRepository, OrderRepository, Store, UnitOfWork};
use crate::types::{
    Fulfillment, FulfillmentContent, FulfillmentMode, NewFulfillment, Order, OrderId, OrderItem,
    OrderStatus, SkuId,
};
use std::sync::Arc;
use std::time::Instant;

/// Result of [`FulfillmentService::create_auto`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderFulfillment {
    /// Order that was fulfilled
    pub order_id: OrderId,
    /// One fulfillment per order item, in item order
    pub fulfillments: Vec<Fulfillment>,
    /// How many of them were created by this call
    pub created: usize,
}

impl OrderFulfillment {
    /// Whether this call found everything already delivered.
    #[must_use]
    pub const fn was_replay(&self) -> bool {
        self.created == 0
    }
}

/// Drives the stock ledger and the secret pool for whole orders.
pub struct FulfillmentService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> Clone for FulfillmentService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            retry: self.retry.clone(),
        }
    }
}

impl<S: Store> FulfillmentService<S> {
    /// Create an orchestrator over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Deliver every item of a paid order.
    ///
    /// Idempotent: items that already have a fulfillment are returned as they are, and an
    /// order that is already `fulfilled` yields its existing fulfillments.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::OrderNotFound`] if the order does not exist
    /// - [`FulfillmentError::OrderNotPayable`] unless the order is `paid` or `fulfilled`
    /// - [`FulfillmentError::PoolExhausted`] if an auto item runs out of secrets
    /// - [`FulfillmentError::InvalidState`] if a manual item has less locked stock than
    ///   its quantity
    #[tracing::instrument(skip(self), err)]
    pub async fn create_auto(&self, order_id: OrderId) -> Result<OrderFulfillment> {
        let started = Instant::now();

        let items = {
            let mut tx = self.store.begin().await?;
            lock_fulfillable_order(&mut tx, order_id).await?;
            let items = tx.order_items(order_id).await?;
            tx.commit().await?;
            items
        };

        let mut fulfillments = Vec::with_capacity(items.len());
        let mut created = 0;
        for item in &items {
            let (fulfillment, is_new) = self.fulfill_item(item).await.inspect_err(|e| {
                tracing::error!(
                    order_id = %order_id,
                    order_item_id = %item.id,
                    error = %e,
                    "Order item could not be fulfilled"
                );
            })?;
            if is_new {
                created += 1;
            }
            fulfillments.push(fulfillment);
        }

        let mut tx = self.store.begin().await?;
        let order = lock_fulfillable_order(&mut tx, order_id).await?;
        if order.status == OrderStatus::Paid {
            tx.set_order_status(order_id, OrderStatus::Fulfilled, self.clock.now())
                .await?;
        }
        tx.commit().await?;

        FulfillmentMetrics::record_order_duration(started.elapsed());
        tracing::info!(
            order_id = %order_id,
            items = fulfillments.len(),
            created,
            "Order fulfilled"
        );
        Ok(OrderFulfillment {
            order_id,
            fulfillments,
            created,
        })
    }

    /// Reserve stock for every manual item of an order awaiting payment.
    ///
    /// All items are reserved in one unit of work: if any SKU runs short nothing stays
    /// locked. The order is marked [`stock_reserved`](Order::stock_reserved) in the same
    /// unit of work, and reserving it again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::OrderNotFound`] if the order does not exist
    /// - [`FulfillmentError::OrderNotPayable`] unless the order is `pending_payment`
    /// - [`FulfillmentError::InsufficientStock`] if a SKU cannot cover its item
    #[tracing::instrument(skip(self), err)]
    pub async fn reserve_order(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let order = lock_order(&mut tx, order_id).await?;
        if order.status != OrderStatus::PendingPayment {
            return Err(FulfillmentError::OrderNotPayable {
                order_id,
                status: order.status,
            });
        }
        if order.stock_reserved {
            tracing::debug!(order_id = %order_id, "Order stock already reserved");
            return Ok(());
        }

        for item in tx.order_items(order_id).await? {
            let (mode, sku_id) = dispatch_target(&mut tx, &item).await?;
            if mode == FulfillmentMode::Manual {
                let outcome =
                    reserve_in(&mut tx, self.clock.as_ref(), sku_id, item.quantity).await;
                FulfillmentMetrics::record_reservation(outcome.is_ok());
                outcome?;
            }
        }
        tx.set_stock_reserved(order_id, true, self.clock.now())
            .await?;
        tx.commit().await?;
        tracing::info!(order_id = %order_id, "Order stock reserved");
        Ok(())
    }

    /// Cancel an order that was not delivered yet.
    ///
    /// If the order's stock was reserved, the undelivered manual items release what they
    /// hold. An order that was never reserved releases nothing.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::OrderNotFound`] if the order does not exist
    /// - [`FulfillmentError::OrderNotPayable`] if the order is `fulfilled` or `cancelled`
    #[tracing::instrument(skip(self), err)]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let order = lock_order(&mut tx, order_id).await?;
        if matches!(order.status, OrderStatus::Fulfilled | OrderStatus::Cancelled) {
            return Err(FulfillmentError::OrderNotPayable {
                order_id,
                status: order.status,
            });
        }

        if order.stock_reserved {
            for item in tx.order_items(order_id).await? {
                if tx.fulfillment_for_item(item.id).await?.is_some() {
                    continue;
                }
                let (mode, sku_id) = dispatch_target(&mut tx, &item).await?;
                if mode == FulfillmentMode::Manual {
                    release_in(&mut tx, self.clock.as_ref(), sku_id, item.quantity).await?;
                }
            }
            tx.set_stock_reserved(order_id, false, self.clock.now())
                .await?;
        }
        tx.set_order_status(order_id, OrderStatus::Cancelled, self.clock.now())
            .await?;
        tx.commit().await?;
        tracing::info!(order_id = %order_id, "Order cancelled");
        Ok(())
    }

    /// Fulfill one item in its own unit of work. Returns the fulfillment and whether it
    /// was created by this call.
    async fn fulfill_item(&self, item: &OrderItem) -> Result<(Fulfillment, bool)> {
        let mut tx = self.store.begin().await?;
        lock_fulfillable_order(&mut tx, item.order_id).await?;

        if let Some(existing) = tx.fulfillment_for_item(item.id).await? {
            FulfillmentMetrics::record_reuse();
            return Ok((existing, false));
        }
        if item.quantity == 0 {
            return Err(FulfillmentError::InvalidQuantity);
        }

        let now = self.clock.now();
        let (mode, sku_id) = dispatch_target(&mut tx, item).await?;
        let content = match mode {
            FulfillmentMode::Auto => {
                let mut secrets = Vec::with_capacity(item.quantity as usize);
                for _ in 0..item.quantity {
                    let secret = allocate_in(
                        &mut tx,
                        &self.retry,
                        now,
                        item.product_id,
                        sku_id,
                        Some(item.id),
                    )
                    .await?;
                    secrets.push(secret.secret);
                }
                FulfillmentContent::Auto(secrets)
            }
            FulfillmentMode::Manual => {
                commit_in(&mut tx, self.clock.as_ref(), sku_id, item.quantity).await?;
                FulfillmentContent::Manual
            }
        };

        let fulfillment = tx
            .insert_fulfillment(NewFulfillment {
                order_id: item.order_id,
                order_item_id: item.id,
                content,
                delivered_at: now,
            })
            .await?;
        tx.commit().await?;

        FulfillmentMetrics::record_fulfillment(mode);
        tracing::debug!(
            order_item_id = %item.id,
            sku_id = %sku_id,
            mode = mode.as_str(),
            "Order item fulfilled"
        );
        Ok((fulfillment, true))
    }
}

async fn lock_order<U: OrderRepository>(tx: &mut U, order_id: OrderId) -> Result<Order> {
    tx.lock_order(order_id)
        .await?
        .ok_or(FulfillmentError::OrderNotFound(order_id))
}

async fn lock_fulfillable_order<U: OrderRepository>(
    tx: &mut U,
    order_id: OrderId,
) -> Result<Order> {
    let order = lock_order(tx, order_id).await?;
    match order.status {
        OrderStatus::Paid | OrderStatus::Fulfilled => Ok(order),
        status => Err(FulfillmentError::OrderNotPayable { order_id, status }),
    }
}

/// The product's fulfillment mode and the SKU an item draws from. Items still carrying
/// the legacy sentinel fall back to the product's single active SKU.
async fn dispatch_target<U: CatalogRepository>(
    tx: &mut U,
    item: &OrderItem,
) -> Result<(FulfillmentMode, SkuId)> {
    let product = tx
        .product(item.product_id)
        .await?
        .ok_or(FulfillmentError::ProductUnavailable(item.product_id))?;
    let sku_id = if item.sku_id.is_legacy() {
        resolve_in(tx, item.product_id, item.sku_id).await?.id
    } else {
        item.sku_id
    };
    Ok((product.fulfillment_mode, sku_id))
}
