//! Shopping cart lines keyed by `(user, product, SKU)`.
//!
//! Writes resolve the SKU up front so a cart line always names a concrete variant.
//! Listing re-validates every line against the current catalog and prunes the ones that
//! can no longer be bought; pruning is best-effort and never fails the listing.

use crate::environment::Clock;
use crate::error::{FulfillmentError, Result};
use crate::metrics::FulfillmentMetrics;
use crate::resolver::resolve_in;
use crate::store::{CartRepository, CatalogRepository, Store, UnitOfWork};
use crate::types::{CartItem, FulfillmentMode, ProductId, ProductSku, SkuId, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// A cart line that can still be bought, priced at its SKU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    /// Stored line, with the current fulfillment mode of the product
    pub item: CartItem,
    /// Resolved SKU
    pub sku: ProductSku,
    /// SKU price per unit
    pub unit_price: Decimal,
    /// `unit_price * quantity`
    pub line_total: Decimal,
}

/// Why a cart line was dropped while listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleReason {
    /// Product missing or inactive
    ProductUnavailable,
    /// SKU missing, inactive, or ambiguous
    SkuUnavailable,
    /// Manual SKU with nothing left to reserve
    OutOfStock,
}

impl StaleReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ProductUnavailable => "product_unavailable",
            Self::SkuUnavailable => "sku_unavailable",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

/// Cart operations.
pub struct CartService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Store> CartService<S> {
    /// Create a cart service over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Add a line or replace the quantity of an existing one.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::InvalidQuantity`] for a zero quantity
    /// - [`FulfillmentError::ProductUnavailable`] if the product is missing or inactive
    /// - [`FulfillmentError::SkuInvalid`] / [`FulfillmentError::SkuRequired`] if the SKU
    ///   cannot be resolved
    /// - [`FulfillmentError::InsufficientStock`] if a manual SKU cannot cover `quantity`
    #[tracing::instrument(skip(self), err)]
    pub async fn upsert_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
        quantity: u32,
    ) -> Result<CartItem> {
        if quantity == 0 {
            return Err(FulfillmentError::InvalidQuantity);
        }

        let mut tx = self.store.begin().await?;
        let product = match tx.product(product_id).await? {
            Some(product) if product.is_active => product,
            _ => return Err(FulfillmentError::ProductUnavailable(product_id)),
        };
        let sku = resolve_in(&mut tx, product_id, sku_id).await?;

        if product.fulfillment_mode == FulfillmentMode::Manual {
            let available = sku.stock.available();
            if available < quantity {
                return Err(FulfillmentError::InsufficientStock {
                    sku_id: sku.id,
                    requested: quantity,
                    available,
                });
            }
        }

        let now = self.clock.now();
        let item = CartItem {
            user_id,
            product_id,
            sku_id: sku.id,
            quantity,
            fulfillment_mode: product.fulfillment_mode,
            created_at: now,
            updated_at: now,
        };
        tx.upsert_cart_item(item.clone()).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Remove a line. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written.
    #[tracing::instrument(skip(self), err)]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_cart_item(user_id, product_id, sku_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// The user's purchasable cart lines.
    ///
    /// # Errors
    ///
    /// Returns error if the cart or catalog cannot be read. Failing to prune a stale line
    /// is logged, not returned.
    #[tracing::instrument(skip(self), err)]
    pub async fn list(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let mut tx = self.store.begin().await?;
        let items = tx.cart_items(user_id).await?;

        let mut lines = Vec::with_capacity(items.len());
        let mut stale = Vec::new();
        for item in items {
            match evaluate_line(&mut tx, item.clone()).await? {
                Ok(line) => lines.push(line),
                Err(reason) => stale.push((item, reason)),
            }
        }
        tx.commit().await?;

        for (item, reason) in stale {
            self.prune(&item, reason).await;
        }
        Ok(lines)
    }

    async fn prune(&self, item: &CartItem, reason: StaleReason) {
        let outcome = async {
            let mut tx = self.store.begin().await?;
            tx.delete_cart_item(item.user_id, item.product_id, item.sku_id)
                .await?;
            tx.commit().await
        }
        .await;

        match outcome {
            Ok(()) => {
                FulfillmentMetrics::record_pruned_cart_line();
                tracing::debug!(
                    user_id = %item.user_id,
                    product_id = %item.product_id,
                    sku_id = %item.sku_id,
                    reason = reason.as_str(),
                    "Pruned stale cart line"
                );
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %item.user_id,
                    product_id = %item.product_id,
                    sku_id = %item.sku_id,
                    reason = reason.as_str(),
                    error = %e,
                    "Failed to prune stale cart line"
                );
            }
        }
    }
}

/// Check a stored line against the catalog. The outer result carries store failures,
/// the inner one whether the line is still purchasable.
async fn evaluate_line<U: CatalogRepository>(
    tx: &mut U,
    mut item: CartItem,
) -> Result<std::result::Result<CartLine, StaleReason>> {
    let product = match tx.product(item.product_id).await? {
        Some(product) if product.is_active => product,
        _ => return Ok(Err(StaleReason::ProductUnavailable)),
    };

    let sku = match resolve_in(tx, item.product_id, item.sku_id).await {
        Ok(sku) => sku,
        Err(FulfillmentError::SkuInvalid { .. } | FulfillmentError::SkuRequired { .. }) => {
            return Ok(Err(StaleReason::SkuUnavailable));
        }
        Err(e) => return Err(e),
    };

    if product.fulfillment_mode == FulfillmentMode::Manual && sku.stock.available() == 0 {
        return Ok(Err(StaleReason::OutOfStock));
    }

    item.fulfillment_mode = product.fulfillment_mode;
    let unit_price = sku.price_amount;
    let line_total = unit_price * Decimal::from(item.quantity);
    Ok(Ok(CartLine {
        item,
        sku,
        unit_price,
        line_total,
    }))
}
