//! Storage abstraction: a handle that opens units of work.
//!
//! Every component receives an `Arc<S: Store>` at construction and opens a [`UnitOfWork`]
//! per operation. A unit of work is a database transaction: reads that lock
//! (`lock_stock`, `lock_product`) hold their row lock until [`UnitOfWork::commit`], and
//! dropping a unit of work without committing rolls every write back. That is what makes
//! a deadline or an early `?` return leave no partial counter mutation behind.
//!
//! # Implementations
//!
//! - `PostgresStore` (in `skufill-postgres`): production implementation over sqlx
//! - `MemoryStore` (in `skufill-testing`): serializable in-memory store for tests
//!
//! The repository traits are split by concern so each component documents which part
//! of the schema it touches.

use crate::error::Result;
use crate::ledger::StockCounters;
use crate::types::{
    CardSecret, CartItem, Fulfillment, NewFulfillment, NewSecretBatch, NewSku, Order, OrderId,
    OrderItem, OrderItemId, OrderStatus, Product, ProductId, ProductSku, SecretBatch, SecretId,
    SkuId, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Handle to the underlying storage.
pub trait Store: Send + Sync + 'static {
    /// Transaction type produced by [`Store::begin`].
    type Tx: UnitOfWork;

    /// Open a new unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::DatabaseError`](crate::FulfillmentError::DatabaseError)
    /// if no connection could be acquired.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;
}

/// An open transaction exposing every repository.
pub trait UnitOfWork:
    CatalogRepository
    + StockRepository
    + SecretRepository
    + OrderRepository
    + CartRepository
    + MigrationRepository
    + Send
{
    /// Make every write of this unit visible and release its locks.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is persisted in that case.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Products and SKUs.
pub trait CatalogRepository: Send {
    /// Load a product.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn product(&mut self, id: ProductId) -> impl Future<Output = Result<Option<Product>>> + Send;

    /// Load a SKU.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn sku(&mut self, id: SkuId) -> impl Future<Output = Result<Option<ProductSku>>> + Send;

    /// SKUs of a product ordered by `(sort_order, id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn skus_for_product(
        &mut self,
        product_id: ProductId,
        active_only: bool,
    ) -> impl Future<Output = Result<Vec<ProductSku>>> + Send;

    /// Insert a SKU.
    ///
    /// # Errors
    ///
    /// Returns error if `(product_id, code)` already exists or the insert fails.
    fn insert_sku(
        &mut self,
        sku: NewSku,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ProductSku>> + Send;
}

/// Per-SKU stock counters.
pub trait StockRepository: Send {
    /// Read a SKU's counters and lock the row until the unit of work ends.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn lock_stock(
        &mut self,
        sku_id: SkuId,
    ) -> impl Future<Output = Result<Option<StockCounters>>> + Send;

    /// Overwrite a SKU's counters. Callers must hold the lock from
    /// [`StockRepository::lock_stock`].
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn store_stock(
        &mut self,
        sku_id: SkuId,
        counters: StockCounters,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Card secrets and their batches.
pub trait SecretRepository: Send {
    /// Insert a batch header.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    fn insert_batch(
        &mut self,
        batch: NewSecretBatch,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<SecretBatch>> + Send;

    /// Which of `payloads` already exist anywhere in the pool.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn existing_payloads(
        &mut self,
        payloads: &[String],
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Insert `available` secrets. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns error if a payload collides or the insert fails.
    fn insert_secrets(
        &mut self,
        batch: &SecretBatch,
        payloads: &[String],
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Some `available` secret of exactly `(product_id, sku_id)`, without claiming it.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn next_available_secret(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> impl Future<Output = Result<Option<CardSecret>>> + Send;

    /// Flip a secret to `used` if and only if it is still `available`.
    ///
    /// Returns `false` when another caller claimed it first.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn claim_secret(
        &mut self,
        secret_id: SecretId,
        order_item_id: Option<OrderItemId>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Flip a secret to `disabled` if and only if it is still `available`.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn disable_secret(
        &mut self,
        secret_id: SecretId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Load a secret.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn secret(
        &mut self,
        secret_id: SecretId,
    ) -> impl Future<Output = Result<Option<CardSecret>>> + Send;

    /// Number of `available` secrets of exactly `(product_id, sku_id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn count_available_secrets(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> impl Future<Output = Result<u64>> + Send;
}

/// Orders, order items and fulfillment rows.
pub trait OrderRepository: Send {
    /// Load an order and lock its row until the unit of work ends.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn lock_order(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<Order>>> + Send;

    /// Items of an order ordered by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn order_items(
        &mut self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Vec<OrderItem>>> + Send;

    /// Move an order to a new status.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn set_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record whether the order's manual items hold reserved stock.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    fn set_stock_reserved(
        &mut self,
        order_id: OrderId,
        reserved: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// The fulfillment row of an order item, if it was delivered.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn fulfillment_for_item(
        &mut self,
        order_item_id: OrderItemId,
    ) -> impl Future<Output = Result<Option<Fulfillment>>> + Send;

    /// Insert a fulfillment row.
    ///
    /// # Errors
    ///
    /// Returns error if the item already has one or the insert fails.
    fn insert_fulfillment(
        &mut self,
        fulfillment: NewFulfillment,
    ) -> impl Future<Output = Result<Fulfillment>> + Send;
}

/// Shopping cart lines.
pub trait CartRepository: Send {
    /// Cart lines of a user ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn cart_items(
        &mut self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<CartItem>>> + Send;

    /// Insert a line or overwrite the quantity of the existing
    /// `(user_id, product_id, sku_id)` line.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails or violates a unique index.
    fn upsert_cart_item(&mut self, item: CartItem) -> impl Future<Output = Result<()>> + Send;

    /// Delete a line. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    fn delete_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// Rows rewritten from the legacy SKU sentinel to a synthesized SKU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReassignedRows {
    /// Order items updated
    pub order_items: u64,
    /// Cart items updated
    pub cart_items: u64,
    /// Secret batches updated
    pub secret_batches: u64,
    /// Secrets updated
    pub secrets: u64,
}

/// A unique index on `cart_items`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name
    pub name: String,
    /// Key columns in index order
    pub columns: Vec<String>,
}

/// Schema and data operations used by the legacy migration.
pub trait MigrationRepository: Send {
    /// Products that have no SKU rows at all.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn products_without_skus(&mut self) -> impl Future<Output = Result<Vec<ProductId>>> + Send;

    /// Load a product and lock its row until the unit of work ends.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn lock_product(
        &mut self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>>> + Send;

    /// Point every legacy-sentinel row of `product_id` at `sku_id`.
    ///
    /// # Errors
    ///
    /// Returns error if any update fails.
    fn reassign_legacy_rows(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ReassignedRows>> + Send;

    /// Unique, non-primary indexes on `cart_items`.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog query fails.
    fn cart_unique_indexes(&mut self) -> impl Future<Output = Result<Vec<IndexInfo>>> + Send;

    /// Drop a unique index (or the constraint backing it) on `cart_items`.
    ///
    /// # Errors
    ///
    /// Returns error if the drop fails.
    fn drop_cart_index(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Create a unique index on `cart_items` over `columns`.
    ///
    /// # Errors
    ///
    /// Returns error if existing rows violate it or the statement fails.
    fn create_cart_unique_index(
        &mut self,
        name: &str,
        columns: &[&str],
    ) -> impl Future<Output = Result<()>> + Send;
}
