//! Legacy migration into the SKU model.
//!
//! A product with zero SKU rows is unmigrated. For each of them the runner synthesizes a
//! [`DEFAULT_SKU_CODE`] SKU that carries the product's price and stock counters, then
//! repoints every row still holding the legacy SKU sentinel at it. A second run finds no
//! such product and writes nothing.
//!
//! Each product is migrated in its own unit of work that locks the product row and checks
//! again that it has no SKU, so two runners started at once cannot both synthesize one.

use crate::environment::Clock;
use crate::error::{FulfillmentError, Result};
use crate::metrics::FulfillmentMetrics;
use crate::resolver::DEFAULT_SKU_CODE;
use crate::store::{CatalogRepository, MigrationRepository, ReassignedRows, Store, UnitOfWork};
use crate::types::{NewSku, ProductId, SkuId, round_money};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Unique index that keys cart lines by SKU.
pub const CART_SKU_INDEX: &str = "idx_cart_user_product_sku";

/// Columns of [`CART_SKU_INDEX`].
pub const CART_SKU_INDEX_COLUMNS: [&str; 3] = ["user_id", "product_id", "sku_id"];

/// Key of the pre-SKU cart unique index.
const LEGACY_CART_KEY: [&str; 2] = ["user_id", "product_id"];

/// One product moved into the SKU model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductMigration {
    /// Migrated product
    pub product_id: ProductId,
    /// Synthesized default SKU
    pub sku_id: SkuId,
    /// Rows repointed from the sentinel
    pub reassigned: ReassignedRows,
}

/// Outcome of the cart index migration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CartIndexMigration {
    /// Legacy indexes dropped
    pub dropped: Vec<String>,
    /// Whether [`CART_SKU_INDEX`] had to be created
    pub created: bool,
}

impl CartIndexMigration {
    /// Whether the run changed the schema.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created || !self.dropped.is_empty()
    }
}

/// Everything a migration run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Products that received a default SKU
    pub products: Vec<ProductMigration>,
    /// Cart index changes
    pub cart_index: CartIndexMigration,
}

impl MigrationReport {
    /// Whether the run wrote anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.products.is_empty() && !self.cart_index.changed()
    }
}

/// Idempotent backfill run once at startup.
pub struct LegacyMigration<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> LegacyMigration<S> {
    /// Create a runner over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Migrate every legacy product, then the cart unique index.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::MigrationFailed`] on any failure; the caller must not
    /// start serving.
    #[tracing::instrument(skip(self), err)]
    pub async fn run(&self) -> Result<MigrationReport> {
        let products = self.migrate_products().await.map_err(into_migration_failure)?;
        let cart_index = self
            .migrate_cart_unique_index()
            .await
            .map_err(into_migration_failure)?;
        let report = MigrationReport {
            products,
            cart_index,
        };
        tracing::info!(
            products = report.products.len(),
            dropped_indexes = report.cart_index.dropped.len(),
            created_index = report.cart_index.created,
            "Legacy SKU migration complete"
        );
        Ok(report)
    }

    /// Synthesize a default SKU for every product that has none.
    ///
    /// # Errors
    ///
    /// Returns error on the first product that fails; products migrated before it stay
    /// migrated.
    pub async fn migrate_products(&self) -> Result<Vec<ProductMigration>> {
        let candidates = {
            let mut tx = self.store.begin().await?;
            let candidates = tx.products_without_skus().await?;
            tx.commit().await?;
            candidates
        };

        let mut migrated = Vec::new();
        for product_id in candidates {
            if let Some(migration) = self.migrate_product(product_id).await? {
                migrated.push(migration);
            }
        }
        Ok(migrated)
    }

    /// Migrate one product. Returns `None` when it already has a SKU or no longer exists.
    ///
    /// # Errors
    ///
    /// Returns error if the SKU insert or a row rewrite fails; nothing of this product is
    /// written in that case.
    #[tracing::instrument(skip(self), err)]
    pub async fn migrate_product(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductMigration>> {
        let mut tx = self.store.begin().await?;
        let Some(product) = tx.lock_product(product_id).await? else {
            return Ok(None);
        };
        if !tx.skus_for_product(product_id, false).await?.is_empty() {
            tracing::debug!(%product_id, "Product already has SKUs");
            return Ok(None);
        }

        let now = self.clock.now();
        let sku = tx
            .insert_sku(
                NewSku {
                    product_id,
                    code: DEFAULT_SKU_CODE.to_string(),
                    price_amount: round_money(product.price_amount),
                    stock: product.legacy_stock,
                    is_active: true,
                    sort_order: 0,
                },
                now,
            )
            .await?;
        let reassigned = tx.reassign_legacy_rows(product_id, sku.id, now).await?;
        tx.commit().await?;

        FulfillmentMetrics::record_migrated_product();
        tracing::info!(
            %product_id,
            sku_id = %sku.id,
            order_items = reassigned.order_items,
            cart_items = reassigned.cart_items,
            secret_batches = reassigned.secret_batches,
            secrets = reassigned.secrets,
            "Default SKU synthesized"
        );
        Ok(Some(ProductMigration {
            product_id,
            sku_id: sku.id,
            reassigned,
        }))
    }

    /// Replace the `(user_id, product_id)` cart unique index with [`CART_SKU_INDEX`].
    ///
    /// # Errors
    ///
    /// Returns error if an index cannot be dropped or created.
    #[tracing::instrument(skip(self), err)]
    pub async fn migrate_cart_unique_index(&self) -> Result<CartIndexMigration> {
        let mut tx = self.store.begin().await?;
        let indexes = tx.cart_unique_indexes().await?;

        let legacy_key: BTreeSet<&str> = LEGACY_CART_KEY.into_iter().collect();
        let mut outcome = CartIndexMigration::default();
        for index in &indexes {
            let key: BTreeSet<&str> = index.columns.iter().map(String::as_str).collect();
            if index.columns.len() == LEGACY_CART_KEY.len() && key == legacy_key {
                tx.drop_cart_index(&index.name).await?;
                tracing::info!(index = %index.name, "Dropped legacy cart unique index");
                outcome.dropped.push(index.name.clone());
            }
        }

        if !indexes.iter().any(|index| index.name == CART_SKU_INDEX) {
            tx.create_cart_unique_index(CART_SKU_INDEX, &CART_SKU_INDEX_COLUMNS)
                .await?;
            tracing::info!(index = CART_SKU_INDEX, "Created cart SKU unique index");
            outcome.created = true;
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

fn into_migration_failure(error: FulfillmentError) -> FulfillmentError {
    match error {
        FulfillmentError::MigrationFailed(_) => error,
        other => FulfillmentError::MigrationFailed(other.to_string()),
    }
}
