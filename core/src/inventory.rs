//! Units a buyer could still purchase, per SKU.

use crate::error::{FulfillmentError, Result};
use crate::resolver::resolve_in;
use crate::store::{CatalogRepository, SecretRepository, Store, UnitOfWork};
use crate::types::{FulfillmentMode, ProductId, SkuId};
use serde::Serialize;
use std::sync::Arc;

/// Availability of one SKU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// Product
    pub product_id: ProductId,
    /// Resolved SKU
    pub sku_id: SkuId,
    /// How the product is delivered
    pub mode: FulfillmentMode,
    /// `total - locked - sold` for manual SKUs, available secrets for auto SKUs
    pub available: u64,
}

/// Read-only availability queries.
pub struct InventoryView<S> {
    store: Arc<S>,
}

impl<S> Clone for InventoryView<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> InventoryView<S> {
    /// Create a view over the given store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Availability of `sku_id` (or the product's only active SKU when it is `0`).
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::ProductUnavailable`] if the product does not exist
    /// - [`FulfillmentError::SkuInvalid`] / [`FulfillmentError::SkuRequired`] if the SKU
    ///   cannot be resolved
    pub async fn availability(
        &self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<Availability> {
        let mut tx = self.store.begin().await?;
        let product = tx
            .product(product_id)
            .await?
            .ok_or(FulfillmentError::ProductUnavailable(product_id))?;
        let sku = resolve_in(&mut tx, product_id, sku_id).await?;

        let available = match product.fulfillment_mode {
            FulfillmentMode::Manual => u64::from(sku.stock.available()),
            FulfillmentMode::Auto => tx.count_available_secrets(product_id, sku.id).await?,
        };
        tx.commit().await?;

        Ok(Availability {
            product_id,
            sku_id: sku.id,
            mode: product.fulfillment_mode,
            available,
        })
    }
}
