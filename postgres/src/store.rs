//! [`PostgresStore`] and its unit of work.

use crate::config::PoolConfig;
use crate::database_error;
use crate::rows::{
    BATCH_COLUMNS, BatchRow, CART_COLUMNS, CartRow, FULFILLMENT_COLUMNS, FulfillmentRow,
    IndexRow, ORDER_ITEM_COLUMNS, OrderItemRow, OrderRow, PRODUCT_COLUMNS, ProductRow,
    SECRET_COLUMNS, SKU_COLUMNS, SecretRow, SkuRow, counters,
};
use chrono::{DateTime, Utc};
use skufill_core::ledger::StockCounters;
use skufill_core::store::{
    CartRepository, CatalogRepository, IndexInfo, MigrationRepository, OrderRepository,
    ReassignedRows, SecretRepository, StockRepository, Store, UnitOfWork,
};
use skufill_core::{
    CardSecret, CartItem, Fulfillment, FulfillmentError, NewFulfillment, NewSecretBatch,
    NewSku, Order, OrderId, OrderItem, OrderItemId, OrderStatus, Product, ProductId,
    ProductSku, Result, SecretBatch, SecretId, SecretStatus, SkuId, UserId,
};
use sqlx::postgres::{PgConnection, PgDatabaseError, PgPool};
use sqlx::{Postgres, Transaction};

/// Production [`Store`] over a sqlx connection pool.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::DatabaseError`] if the database is unreachable.
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        Ok(Self::from_pool(config.connect().await?))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create missing tables and add the `sku_id` columns to legacy tables.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::DatabaseError`] if a statement fails.
    pub async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(crate::SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        tracing::info!("Schema applied");
        Ok(())
    }
}

impl Store for PostgresStore {
    type Tx = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork> {
        let tx = self.pool.begin().await.map_err(database_error)?;
        Ok(PgUnitOfWork { tx })
    }
}

/// One database transaction. Dropping it without [`UnitOfWork::commit`] rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(database_error)
    }
}

const SECRET_UNIQUE_CONSTRAINT: &str = "uq_card_secrets_secret";

/// Map a failed secret insert, turning a lost race on the payload unique constraint into
/// [`FulfillmentError::DuplicateSecret`].
fn secret_insert_error(error: sqlx::Error, payloads: &[String]) -> FulfillmentError {
    let Some(db_error) = error.as_database_error() else {
        return database_error(error);
    };
    if !db_error.is_unique_violation() || db_error.constraint() != Some(SECRET_UNIQUE_CONSTRAINT)
    {
        return database_error(error);
    }
    let colliding = db_error
        .try_downcast_ref::<PgDatabaseError>()
        .and_then(PgDatabaseError::detail)
        .and_then(duplicate_key);
    tracing::warn!(
        payload = colliding.as_deref(),
        "Secret inserted concurrently by another ingest"
    );
    FulfillmentError::DuplicateSecret {
        payloads: colliding.map_or_else(|| payloads.to_vec(), |payload| vec![payload]),
    }
}

/// Key value from a unique violation detail such as `Key (secret)=(ABC) already exists.`
fn duplicate_key(detail: &str) -> Option<String> {
    let start = detail.find(")=(")? + 3;
    let end = detail.rfind(") already exists")?;
    (start <= end).then(|| detail[start..end].to_string())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl CatalogRepository for PgUnitOfWork {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(Product::try_from)
            .transpose()
    }

    async fn sku(&mut self, id: SkuId) -> Result<Option<ProductSku>> {
        let sql = format!("SELECT {SKU_COLUMNS} FROM product_skus WHERE id = $1");
        sqlx::query_as::<_, SkuRow>(&sql)
            .bind(id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(ProductSku::try_from)
            .transpose()
    }

    async fn skus_for_product(
        &mut self,
        product_id: ProductId,
        active_only: bool,
    ) -> Result<Vec<ProductSku>> {
        let sql = format!(
            "SELECT {SKU_COLUMNS} FROM product_skus \
             WHERE product_id = $1 AND (NOT $2 OR is_active) \
             ORDER BY sort_order, id"
        );
        sqlx::query_as::<_, SkuRow>(&sql)
            .bind(product_id.get())
            .bind(active_only)
            .fetch_all(self.conn())
            .await
            .map_err(database_error)?
            .into_iter()
            .map(ProductSku::try_from)
            .collect()
    }

    async fn insert_sku(&mut self, sku: NewSku, now: DateTime<Utc>) -> Result<ProductSku> {
        let sql = format!(
            "INSERT INTO product_skus (
                product_id, sku_code, price_amount, manual_stock_total, manual_stock_locked,
                manual_stock_sold, is_active, sort_order, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {SKU_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SkuRow>(&sql)
            .bind(sku.product_id.get())
            .bind(&sku.code)
            .bind(sku.price_amount)
            .bind(i64::from(sku.stock.total))
            .bind(i64::from(sku.stock.locked))
            .bind(i64::from(sku.stock.sold))
            .bind(sku.is_active)
            .bind(sku.sort_order)
            .bind(now)
            .fetch_one(self.conn())
            .await
            .map_err(database_error)?;
        ProductSku::try_from(row)
    }
}

impl StockRepository for PgUnitOfWork {
    async fn lock_stock(&mut self, sku_id: SkuId) -> Result<Option<StockCounters>> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r"
            SELECT manual_stock_total, manual_stock_locked, manual_stock_sold
            FROM product_skus
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(sku_id.get())
        .fetch_optional(self.conn())
        .await
        .map_err(database_error)?;

        row.map(|(total, locked, sold)| counters(total, locked, sold))
            .transpose()
    }

    async fn store_stock(
        &mut self,
        sku_id: SkuId,
        counters: StockCounters,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r"
            UPDATE product_skus
            SET manual_stock_total = $2,
                manual_stock_locked = $3,
                manual_stock_sold = $4,
                updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(sku_id.get())
        .bind(i64::from(counters.total))
        .bind(i64::from(counters.locked))
        .bind(i64::from(counters.sold))
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();

        if updated == 0 {
            return Err(FulfillmentError::DatabaseError(format!(
                "SKU {sku_id} vanished"
            )));
        }
        Ok(())
    }
}

impl SecretRepository for PgUnitOfWork {
    async fn insert_batch(
        &mut self,
        batch: NewSecretBatch,
        now: DateTime<Utc>,
    ) -> Result<SecretBatch> {
        let sql = format!(
            "INSERT INTO card_secret_batches (
                product_id, sku_id, batch_no, source, total_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {BATCH_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch.product_id.get())
            .bind(batch.sku_id.get())
            .bind(&batch.batch_no)
            .bind(batch.source.as_str())
            .bind(i64::from(batch.total_count))
            .bind(now)
            .fetch_one(self.conn())
            .await
            .map_err(database_error)?;
        SecretBatch::try_from(row)
    }

    async fn existing_payloads(&mut self, payloads: &[String]) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r"
            SELECT secret
            FROM card_secrets
            WHERE secret = ANY($1)
            ORDER BY secret
            ",
        )
        .bind(payloads)
        .fetch_all(self.conn())
        .await
        .map_err(database_error)
    }

    async fn insert_secrets(
        &mut self,
        batch: &SecretBatch,
        payloads: &[String],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let inserted = sqlx::query(
            r"
            INSERT INTO card_secrets (
                product_id, sku_id, batch_id, secret, status, created_at, updated_at
            )
            SELECT $1, $2, $3, payload, 'available', $5, $5
            FROM UNNEST($4::text[]) WITH ORDINALITY AS p(payload, ord)
            ORDER BY ord
            ",
        )
        .bind(batch.product_id.get())
        .bind(batch.sku_id.get())
        .bind(batch.id.get())
        .bind(payloads)
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(|e| secret_insert_error(e, payloads))?
        .rows_affected();
        Ok(inserted)
    }

    async fn next_available_secret(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<Option<CardSecret>> {
        let sql = format!(
            "SELECT {SECRET_COLUMNS} FROM card_secrets \
             WHERE product_id = $1 AND sku_id = $2 AND status = 'available' \
             ORDER BY id \
             LIMIT 1"
        );
        sqlx::query_as::<_, SecretRow>(&sql)
            .bind(product_id.get())
            .bind(sku_id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(CardSecret::try_from)
            .transpose()
    }

    async fn claim_secret(
        &mut self,
        secret_id: SecretId,
        order_item_id: Option<OrderItemId>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // Blocks on a concurrent claimer's row lock, then re-checks the status.
        let claimed = sqlx::query(
            r"
            UPDATE card_secrets
            SET status = $2, used_by_order_item = $3, used_at = $4, updated_at = $4
            WHERE id = $1 AND status = 'available'
            ",
        )
        .bind(secret_id.get())
        .bind(SecretStatus::Used.as_str())
        .bind(order_item_id.map(OrderItemId::get))
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();
        Ok(claimed == 1)
    }

    async fn disable_secret(&mut self, secret_id: SecretId, now: DateTime<Utc>) -> Result<bool> {
        let disabled = sqlx::query(
            r"
            UPDATE card_secrets
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = 'available'
            ",
        )
        .bind(secret_id.get())
        .bind(SecretStatus::Disabled.as_str())
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();
        Ok(disabled == 1)
    }

    async fn secret(&mut self, secret_id: SecretId) -> Result<Option<CardSecret>> {
        let sql = format!("SELECT {SECRET_COLUMNS} FROM card_secrets WHERE id = $1");
        sqlx::query_as::<_, SecretRow>(&sql)
            .bind(secret_id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(CardSecret::try_from)
            .transpose()
    }

    async fn count_available_secrets(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM card_secrets
            WHERE product_id = $1 AND sku_id = $2 AND status = 'available'
            ",
        )
        .bind(product_id.get())
        .bind(sku_id.get())
        .fetch_one(self.conn())
        .await
        .map_err(database_error)?;

        u64::try_from(count)
            .map_err(|_| FulfillmentError::DatabaseError(format!("negative count: {count}")))
    }
}

impl OrderRepository for PgUnitOfWork {
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, order_no, user_id, status, stock_reserved
            FROM orders
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(order_id.get())
        .fetch_optional(self.conn())
        .await
        .map_err(database_error)?
        .map(Order::try_from)
        .transpose()
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(order_id.get())
            .fetch_all(self.conn())
            .await
            .map_err(database_error)?
            .into_iter()
            .map(OrderItem::try_from)
            .collect()
    }

    async fn set_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.get())
            .bind(status.as_str())
            .bind(now)
            .execute(self.conn())
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn set_stock_reserved(
        &mut self,
        order_id: OrderId,
        reserved: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE orders SET stock_reserved = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.get())
            .bind(reserved)
            .bind(now)
            .execute(self.conn())
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn fulfillment_for_item(
        &mut self,
        order_item_id: OrderItemId,
    ) -> Result<Option<Fulfillment>> {
        let sql =
            format!("SELECT {FULFILLMENT_COLUMNS} FROM fulfillments WHERE order_item_id = $1");
        sqlx::query_as::<_, FulfillmentRow>(&sql)
            .bind(order_item_id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(Fulfillment::try_from)
            .transpose()
    }

    async fn insert_fulfillment(&mut self, fulfillment: NewFulfillment) -> Result<Fulfillment> {
        let sql = format!(
            "INSERT INTO fulfillments (
                order_id, order_item_id, fulfillment_type, payload, delivered_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING {FULFILLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, FulfillmentRow>(&sql)
            .bind(fulfillment.order_id.get())
            .bind(fulfillment.order_item_id.get())
            .bind(fulfillment.content.mode().as_str())
            .bind(fulfillment.content.payload())
            .bind(fulfillment.delivered_at)
            .fetch_one(self.conn())
            .await
            .map_err(database_error)?;
        Fulfillment::try_from(row)
    }
}

impl CartRepository for PgUnitOfWork {
    async fn cart_items(&mut self, user_id: UserId) -> Result<Vec<CartItem>> {
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM cart_items \
             WHERE user_id = $1 \
             ORDER BY created_at, product_id, sku_id"
        );
        sqlx::query_as::<_, CartRow>(&sql)
            .bind(user_id.get())
            .fetch_all(self.conn())
            .await
            .map_err(database_error)?
            .into_iter()
            .map(CartItem::try_from)
            .collect()
    }

    async fn upsert_cart_item(&mut self, item: CartItem) -> Result<()> {
        // No ON CONFLICT: the unique index may still be the legacy (user, product) one.
        let updated = sqlx::query(
            r"
            UPDATE cart_items
            SET quantity = $4, fulfillment_type = $5, updated_at = $6
            WHERE user_id = $1 AND product_id = $2 AND sku_id = $3
            ",
        )
        .bind(item.user_id.get())
        .bind(item.product_id.get())
        .bind(item.sku_id.get())
        .bind(i64::from(item.quantity))
        .bind(item.fulfillment_mode.as_str())
        .bind(item.updated_at)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();
        if updated > 0 {
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO cart_items (
                user_id, product_id, sku_id, quantity, fulfillment_type, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(item.user_id.get())
        .bind(item.product_id.get())
        .bind(item.sku_id.get())
        .bind(i64::from(item.quantity))
        .bind(item.fulfillment_mode.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(self.conn())
        .await
        .map_err(database_error)?;
        Ok(())
    }

    async fn delete_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2 AND sku_id = $3",
        )
        .bind(user_id.get())
        .bind(product_id.get())
        .bind(sku_id.get())
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();
        Ok(deleted > 0)
    }
}

impl MigrationRepository for PgUnitOfWork {
    async fn products_without_skus(&mut self) -> Result<Vec<ProductId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r"
            SELECT p.id
            FROM products p
            WHERE NOT EXISTS (SELECT 1 FROM product_skus s WHERE s.product_id = p.id)
            ORDER BY p.id
            ",
        )
        .fetch_all(self.conn())
        .await
        .map_err(database_error)?;
        Ok(ids.into_iter().map(ProductId::new).collect())
    }

    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product_id.get())
            .fetch_optional(self.conn())
            .await
            .map_err(database_error)?
            .map(Product::try_from)
            .transpose()
    }

    async fn reassign_legacy_rows(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
        now: DateTime<Utc>,
    ) -> Result<ReassignedRows> {
        let order_items = sqlx::query(
            "UPDATE order_items SET sku_id = $2 WHERE product_id = $1 AND sku_id = 0",
        )
        .bind(product_id.get())
        .bind(sku_id.get())
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();

        let cart_items = sqlx::query(
            r"
            UPDATE cart_items
            SET sku_id = $2, updated_at = $3
            WHERE product_id = $1 AND sku_id = 0
            ",
        )
        .bind(product_id.get())
        .bind(sku_id.get())
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();

        let secret_batches = sqlx::query(
            "UPDATE card_secret_batches SET sku_id = $2 WHERE product_id = $1 AND sku_id = 0",
        )
        .bind(product_id.get())
        .bind(sku_id.get())
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();

        let secrets = sqlx::query(
            r"
            UPDATE card_secrets
            SET sku_id = $2, updated_at = $3
            WHERE product_id = $1 AND sku_id = 0
            ",
        )
        .bind(product_id.get())
        .bind(sku_id.get())
        .bind(now)
        .execute(self.conn())
        .await
        .map_err(database_error)?
        .rows_affected();

        Ok(ReassignedRows {
            order_items,
            cart_items,
            secret_batches,
            secrets,
        })
    }

    async fn cart_unique_indexes(&mut self) -> Result<Vec<IndexInfo>> {
        let rows = sqlx::query_as::<_, IndexRow>(
            r"
            SELECT i.relname::text AS name,
                   array_agg(a.attname::text ORDER BY k.ord) AS columns
            FROM pg_index x
            JOIN pg_class t ON t.oid = x.indrelid
            JOIN pg_class i ON i.oid = x.indexrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(x.indkey::smallint[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE t.relname = 'cart_items'
              AND n.nspname = current_schema()
              AND x.indisunique
              AND NOT x.indisprimary
            GROUP BY i.relname
            ORDER BY i.relname
            ",
        )
        .fetch_all(self.conn())
        .await
        .map_err(database_error)?;

        Ok(rows
            .into_iter()
            .map(|row| IndexInfo {
                name: row.name,
                columns: row.columns,
            })
            .collect())
    }

    async fn drop_cart_index(&mut self, name: &str) -> Result<()> {
        let is_constraint: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1
                FROM pg_constraint c
                JOIN pg_class t ON t.oid = c.conrelid
                WHERE t.relname = 'cart_items' AND c.conname = $1
            )
            ",
        )
        .bind(name)
        .fetch_one(self.conn())
        .await
        .map_err(database_error)?;

        let ddl = if is_constraint {
            format!("ALTER TABLE cart_items DROP CONSTRAINT {}", quote_ident(name))
        } else {
            format!("DROP INDEX {}", quote_ident(name))
        };
        tracing::debug!(%ddl, "Dropping cart index");
        sqlx::Executor::execute(self.conn(), ddl.as_str())
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn create_cart_unique_index(&mut self, name: &str, columns: &[&str]) -> Result<()> {
        let columns: Vec<String> = columns.iter().map(|column| quote_ident(column)).collect();
        let ddl = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON cart_items ({})",
            quote_ident(name),
            columns.join(", ")
        );
        tracing::debug!(%ddl, "Creating cart index");
        sqlx::Executor::execute(self.conn(), ddl.as_str())
            .await
            .map_err(database_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{duplicate_key, quote_ident, secret_insert_error};
    use skufill_core::FulfillmentError;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("idx_cart_user_product"), "\"idx_cart_user_product\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn duplicate_key_reads_violation_detail() {
        assert_eq!(
            duplicate_key("Key (secret)=(CARD-001) already exists."),
            Some("CARD-001".to_string())
        );
        assert_eq!(
            duplicate_key("Key (secret)=(odd)=(value) already exists."),
            Some("odd)=(value".to_string())
        );
        assert_eq!(duplicate_key("something else"), None);
    }

    #[test]
    fn non_database_errors_stay_database_errors() {
        let error = secret_insert_error(sqlx::Error::RowNotFound, &["A".to_string()]);
        assert!(matches!(error, FulfillmentError::DatabaseError(_)));
    }

    #[test]
    fn schema_declares_every_table() {
        for table in [
            "products",
            "product_skus",
            "card_secrets",
            "card_secret_batches",
            "orders",
            "order_items",
            "cart_items",
            "fulfillments",
        ] {
            assert!(
                crate::SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }
}
