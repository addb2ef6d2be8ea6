//! Engine startup: schema, legacy migration, then services.
//!
//! The migration runs to completion before any service is handed out; a failed
//! migration aborts startup.

use crate::config::Config;
use skufill_core::{
    CartService, Clock, FulfillmentService, InventoryView, LegacyMigration, MigrationReport,
    OrderFulfillment, OrderId, Result, RetryPolicy, SecretPool, SkuResolver, StockLedger, Store,
    SystemClock, with_deadline,
};
use skufill_postgres::PostgresStore;
use std::sync::Arc;
use std::time::Duration;

/// Every engine component over one shared store.
pub struct Engine<S> {
    store: Arc<S>,
    operation_timeout: Duration,
    migration: MigrationReport,
    /// Manual stock counters
    pub ledger: StockLedger<S>,
    /// Card secret pool
    pub secrets: SecretPool<S>,
    /// SKU resolution
    pub resolver: SkuResolver<S>,
    /// Order fulfillment
    pub fulfillment: FulfillmentService<S>,
    /// Cart lines
    pub cart: CartService<S>,
    /// Availability queries
    pub inventory: InventoryView<S>,
}

impl Engine<PostgresStore> {
    /// Connect, apply the schema, migrate legacy data and build the services.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable, the schema cannot be applied, or
    /// the migration fails.
    #[tracing::instrument(skip_all, err)]
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        let store = PostgresStore::connect(&config.database.pool_config()).await?;
        store.apply_schema().await?;
        Self::start(
            Arc::new(store),
            Arc::new(SystemClock),
            config.allocation.retry_policy(),
            config.operation_timeout,
        )
        .await
    }
}

impl<S: Store> Engine<S> {
    /// Migrate legacy data in `store`, then build the services.
    ///
    /// # Errors
    ///
    /// Returns [`skufill_core::FulfillmentError::MigrationFailed`] if the migration fails.
    pub async fn start(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let migration = LegacyMigration::new(Arc::clone(&store), Arc::clone(&clock))
            .run()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Legacy migration failed"))?;

        tracing::info!(
            migrated_products = migration.products.len(),
            ?operation_timeout,
            "Engine started"
        );

        Ok(Self {
            ledger: StockLedger::new(Arc::clone(&store), Arc::clone(&clock)),
            secrets: SecretPool::new(Arc::clone(&store), Arc::clone(&clock), retry.clone()),
            resolver: SkuResolver::new(Arc::clone(&store)),
            fulfillment: FulfillmentService::new(Arc::clone(&store), Arc::clone(&clock), retry),
            cart: CartService::new(Arc::clone(&store), clock),
            inventory: InventoryView::new(Arc::clone(&store)),
            store,
            operation_timeout,
            migration,
        })
    }

    /// The shared store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// What the startup migration did.
    #[must_use]
    pub const fn migration(&self) -> &MigrationReport {
        &self.migration
    }

    /// Deadline applied by [`Self::fulfill_order`].
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Fulfill a paid order within the configured operation timeout.
    ///
    /// # Errors
    ///
    /// Returns [`skufill_core::FulfillmentError::Timeout`] if the deadline passes, or any
    /// error of [`FulfillmentService::create_auto`].
    pub async fn fulfill_order(&self, order_id: OrderId) -> Result<OrderFulfillment> {
        with_deadline(self.operation_timeout, self.fulfillment.create_auto(order_id)).await
    }
}
