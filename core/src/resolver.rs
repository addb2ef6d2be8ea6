//! SKU resolution for a product plus an optional SKU id.
//!
//! Callers that predate SKUs send `0`. During the compatibility window that is accepted
//! only when it is unambiguous: the product has exactly one active SKU.

use crate::error::{FulfillmentError, Result};
use crate::store::{CatalogRepository, Store, UnitOfWork};
use crate::types::{ProductId, ProductSku, SkuId};
use std::sync::Arc;

/// Code of the SKU synthesized for legacy single-SKU products.
pub const DEFAULT_SKU_CODE: &str = "DEFAULT";

/// Resolves the concrete SKU an order line or cart line refers to.
pub struct SkuResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for SkuResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> SkuResolver<S> {
    /// Create a resolver over the given store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve `requested` for `product_id`.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::SkuInvalid`] if the SKU is missing, foreign or inactive, or
    ///   `requested` is `0` and the product has no active SKU
    /// - [`FulfillmentError::SkuRequired`] if `requested` is `0` and several SKUs are active
    #[tracing::instrument(skip(self), err)]
    pub async fn resolve(&self, product_id: ProductId, requested: SkuId) -> Result<ProductSku> {
        let mut tx = self.store.begin().await?;
        let sku = resolve_in(&mut tx, product_id, requested).await?;
        tx.commit().await?;
        Ok(sku)
    }
}

/// [`SkuResolver::resolve`] inside an open unit of work.
///
/// # Errors
///
/// See [`SkuResolver::resolve`].
pub async fn resolve_in<U: CatalogRepository>(
    tx: &mut U,
    product_id: ProductId,
    requested: SkuId,
) -> Result<ProductSku> {
    if !requested.is_legacy() {
        return match tx.sku(requested).await? {
            Some(sku) if sku.product_id == product_id && sku.is_active => Ok(sku),
            _ => Err(FulfillmentError::SkuInvalid {
                product_id,
                sku_id: requested,
            }),
        };
    }

    let mut active = tx.skus_for_product(product_id, true).await?;
    match active.len() {
        1 => Ok(active.remove(0)),
        0 => Err(FulfillmentError::SkuInvalid {
            product_id,
            sku_id: requested,
        }),
        active_skus => Err(FulfillmentError::SkuRequired {
            product_id,
            active_skus,
        }),
    }
}

/// Resolution used when importing secrets: an unspecified SKU prefers the product's
/// active [`DEFAULT_SKU_CODE`] SKU before falling back to [`resolve_in`].
///
/// # Errors
///
/// See [`SkuResolver::resolve`].
pub async fn resolve_for_ingest_in<U: CatalogRepository>(
    tx: &mut U,
    product_id: ProductId,
    requested: SkuId,
) -> Result<ProductSku> {
    if requested.is_legacy() {
        let active = tx.skus_for_product(product_id, true).await?;
        if let Some(default) = active.into_iter().find(|sku| sku.code == DEFAULT_SKU_CODE) {
            return Ok(default);
        }
    }
    resolve_in(tx, product_id, requested).await
}
