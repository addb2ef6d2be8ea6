//! In-memory [`Store`] with real transaction semantics.
//!
//! A unit of work holds the store-wide lock for its whole lifetime and mutates a private
//! copy of the state. Committing swaps the copy in; dropping it discards every write.
//! Units of work are therefore serializable, which is stricter than the row locks of the
//! Postgres store but keeps the same observable guarantees.
//!
//! The store also emulates the unique constraints the engine relies on (`(product_id,
//! code)` on SKUs, global secret payloads, one fulfillment per order item and the
//! configurable unique indexes on cart lines) and can inject faults: lost claim races and
//! per-write latency.

use chrono::{DateTime, Utc};
use skufill_core::error::{FulfillmentError, Result};
use skufill_core::ledger::StockCounters;
use skufill_core::migration::{CART_SKU_INDEX, CART_SKU_INDEX_COLUMNS};
use skufill_core::store::{
    CartRepository, CatalogRepository, IndexInfo, MigrationRepository, OrderRepository,
    ReassignedRows, SecretRepository, StockRepository, Store, UnitOfWork,
};
use skufill_core::types::{
    BatchId, CardSecret, CartItem, Fulfillment, FulfillmentId, NewFulfillment, NewSecretBatch,
    NewSku, Order, OrderId, OrderItem, OrderItemId, OrderStatus, Product, ProductId, ProductSku,
    SecretBatch, SecretId, SecretStatus, SkuId, UserId,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type CartKey = (UserId, ProductId, SkuId);

/// Everything the in-memory store holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    skus: BTreeMap<SkuId, ProductSku>,
    batches: BTreeMap<BatchId, SecretBatch>,
    secrets: BTreeMap<SecretId, CardSecret>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    cart: BTreeMap<CartKey, CartItem>,
    fulfillments: BTreeMap<FulfillmentId, Fulfillment>,
    cart_indexes: Vec<IndexInfo>,
}

fn next_id<K: Copy, V>(map: &BTreeMap<K, V>, raw: impl Fn(K) -> i64) -> i64 {
    map.keys().next_back().map_or(1, |key| raw(*key) + 1)
}

fn unique_violation(constraint: &str) -> FulfillmentError {
    FulfillmentError::DatabaseError(format!(
        "duplicate key value violates unique constraint \"{constraint}\""
    ))
}

fn cart_column(item: &CartItem, column: &str) -> Option<i64> {
    match column {
        "user_id" => Some(item.user_id.get()),
        "product_id" => Some(item.product_id.get()),
        "sku_id" => Some(item.sku_id.get()),
        _ => None,
    }
}

fn index_key(item: &CartItem, columns: &[String]) -> Vec<Option<i64>> {
    columns.iter().map(|column| cart_column(item, column)).collect()
}

impl MemoryState {
    // ═══════════════════════════════════════════════════════════
    // Seeding
    // ═══════════════════════════════════════════════════════════

    /// Insert or replace a product.
    pub fn add_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    /// Insert or replace a SKU.
    pub fn add_sku(&mut self, sku: ProductSku) {
        self.skus.insert(sku.id, sku);
    }

    /// Insert or replace a secret batch.
    pub fn add_batch(&mut self, batch: SecretBatch) {
        self.batches.insert(batch.id, batch);
    }

    /// Insert or replace a secret.
    pub fn add_secret(&mut self, secret: CardSecret) {
        self.secrets.insert(secret.id, secret);
    }

    /// Insert or replace an order.
    pub fn add_order(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    /// Insert or replace an order item.
    pub fn add_order_item(&mut self, item: OrderItem) {
        self.order_items.insert(item.id, item);
    }

    /// Insert or replace a cart line without checking unique indexes.
    pub fn add_cart_item(&mut self, item: CartItem) {
        self.cart
            .insert((item.user_id, item.product_id, item.sku_id), item);
    }

    /// Replace the unique indexes declared on cart lines.
    pub fn set_cart_indexes(&mut self, indexes: Vec<IndexInfo>) {
        self.cart_indexes = indexes;
    }

    // ═══════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════

    /// A SKU by id.
    #[must_use]
    pub fn sku(&self, id: SkuId) -> Option<&ProductSku> {
        self.skus.get(&id)
    }

    /// SKUs of a product in id order.
    #[must_use]
    pub fn skus_of(&self, product_id: ProductId) -> Vec<&ProductSku> {
        self.skus
            .values()
            .filter(|sku| sku.product_id == product_id)
            .collect()
    }

    /// A secret by id.
    #[must_use]
    pub fn secret(&self, id: SecretId) -> Option<&CardSecret> {
        self.secrets.get(&id)
    }

    /// Every secret in id order.
    pub fn secrets(&self) -> impl Iterator<Item = &CardSecret> {
        self.secrets.values()
    }

    /// Every batch in id order.
    pub fn batches(&self) -> impl Iterator<Item = &SecretBatch> {
        self.batches.values()
    }

    /// An order by id.
    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// An order item by id.
    #[must_use]
    pub fn order_item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.order_items.get(&id)
    }

    /// Every fulfillment in id order.
    pub fn fulfillments(&self) -> impl Iterator<Item = &Fulfillment> {
        self.fulfillments.values()
    }

    /// Every cart line in key order.
    pub fn cart_lines(&self) -> impl Iterator<Item = &CartItem> {
        self.cart.values()
    }

    /// Unique indexes declared on cart lines.
    #[must_use]
    pub fn cart_indexes(&self) -> &[IndexInfo] {
        &self.cart_indexes
    }

    fn check_cart_indexes(&self, candidate: &CartItem) -> Result<()> {
        let own_key = (candidate.user_id, candidate.product_id, candidate.sku_id);
        for index in &self.cart_indexes {
            let wanted = index_key(candidate, &index.columns);
            let collides = self
                .cart
                .iter()
                .filter(|(key, _)| **key != own_key)
                .any(|(_, existing)| index_key(existing, &index.columns) == wanted);
            if collides {
                return Err(unique_violation(&index.name));
            }
        }
        Ok(())
    }
}

/// Serializable in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    claim_losses: Arc<AtomicU32>,
    write_latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store whose cart lines are unique per `(user, product, SKU)`.
    #[must_use]
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.cart_indexes.push(IndexInfo {
            name: CART_SKU_INDEX.to_string(),
            columns: CART_SKU_INDEX_COLUMNS.iter().map(ToString::to_string).collect(),
        });
        Self::from_state(state)
    }

    /// Empty store with the pre-SKU cart index on `(user_id, product_id)` only.
    #[must_use]
    pub fn legacy() -> Self {
        let mut state = MemoryState::default();
        state.cart_indexes.push(IndexInfo {
            name: "idx_cart_user_product".to_string(),
            columns: vec!["user_id".to_string(), "product_id".to_string()],
        });
        Self::from_state(state)
    }

    /// Store holding `state`.
    #[must_use]
    pub fn from_state(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            claim_losses: Arc::new(AtomicU32::new(0)),
            write_latency: None,
        }
    }

    /// Sleep before every write, e.g. to let a deadline expire mid-transaction.
    #[must_use]
    pub const fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = Some(latency);
        self
    }

    /// Make the next `count` claims lose their race, as if another allocator took the
    /// candidate secret first.
    pub fn lose_next_claims(&self, count: u32) {
        self.claim_losses.store(count, Ordering::SeqCst);
    }

    /// Mutate committed state directly.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            claim_losses: Arc::clone(&self.claim_losses),
            write_latency: self.write_latency,
        })
    }
}

/// Unit of work over a private copy of the state.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    claim_losses: Arc<AtomicU32>,
    write_latency: Option<Duration>,
}

impl MemoryTx {
    async fn pause(&self) {
        if let Some(latency) = self.write_latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_claim_loss(&self) -> bool {
        self.claim_losses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl UnitOfWork for MemoryTx {
    async fn commit(self) -> Result<()> {
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }
}

impl CatalogRepository for MemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn sku(&mut self, id: SkuId) -> Result<Option<ProductSku>> {
        Ok(self.working.skus.get(&id).cloned())
    }

    async fn skus_for_product(
        &mut self,
        product_id: ProductId,
        active_only: bool,
    ) -> Result<Vec<ProductSku>> {
        let mut skus: Vec<ProductSku> = self
            .working
            .skus
            .values()
            .filter(|sku| sku.product_id == product_id && (!active_only || sku.is_active))
            .cloned()
            .collect();
        skus.sort_by_key(|sku| (sku.sort_order, sku.id));
        Ok(skus)
    }

    async fn insert_sku(&mut self, sku: NewSku, now: DateTime<Utc>) -> Result<ProductSku> {
        self.pause().await;
        let state = &mut self.working;
        if state
            .skus
            .values()
            .any(|existing| existing.product_id == sku.product_id && existing.code == sku.code)
        {
            return Err(unique_violation("uq_product_skus_product_code"));
        }
        let row = ProductSku {
            id: SkuId::new(next_id(&state.skus, SkuId::get)),
            product_id: sku.product_id,
            code: sku.code,
            price_amount: sku.price_amount,
            stock: sku.stock,
            is_active: sku.is_active,
            sort_order: sku.sort_order,
            created_at: now,
            updated_at: now,
        };
        state.skus.insert(row.id, row.clone());
        Ok(row)
    }
}

impl StockRepository for MemoryTx {
    async fn lock_stock(&mut self, sku_id: SkuId) -> Result<Option<StockCounters>> {
        Ok(self.working.skus.get(&sku_id).map(|sku| sku.stock))
    }

    async fn store_stock(
        &mut self,
        sku_id: SkuId,
        counters: StockCounters,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.pause().await;
        let sku = self
            .working
            .skus
            .get_mut(&sku_id)
            .ok_or_else(|| FulfillmentError::DatabaseError(format!("SKU {sku_id} vanished")))?;
        sku.stock = counters;
        sku.updated_at = now;
        Ok(())
    }
}

impl SecretRepository for MemoryTx {
    async fn insert_batch(
        &mut self,
        batch: NewSecretBatch,
        now: DateTime<Utc>,
    ) -> Result<SecretBatch> {
        self.pause().await;
        let state = &mut self.working;
        if state
            .batches
            .values()
            .any(|existing| existing.batch_no == batch.batch_no)
        {
            return Err(unique_violation("uq_card_secret_batches_batch_no"));
        }
        let row = SecretBatch {
            id: BatchId::new(next_id(&state.batches, BatchId::get)),
            product_id: batch.product_id,
            sku_id: batch.sku_id,
            batch_no: batch.batch_no,
            source: batch.source,
            total_count: batch.total_count,
            created_at: now,
        };
        state.batches.insert(row.id, row.clone());
        Ok(row)
    }

    async fn existing_payloads(&mut self, payloads: &[String]) -> Result<Vec<String>> {
        let stored: HashSet<&str> = self
            .working
            .secrets
            .values()
            .map(|secret| secret.secret.as_str())
            .collect();
        Ok(payloads
            .iter()
            .filter(|payload| stored.contains(payload.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_secrets(
        &mut self,
        batch: &SecretBatch,
        payloads: &[String],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.pause().await;
        let state = &mut self.working;
        let mut inserted = 0;
        for payload in payloads {
            if state.secrets.values().any(|secret| &secret.secret == payload) {
                // same mapping as the Postgres store's payload constraint
                return Err(FulfillmentError::DuplicateSecret {
                    payloads: vec![payload.clone()],
                });
            }
            let id = SecretId::new(next_id(&state.secrets, SecretId::get));
            state.secrets.insert(
                id,
                CardSecret {
                    id,
                    product_id: batch.product_id,
                    sku_id: batch.sku_id,
                    batch_id: Some(batch.id),
                    secret: payload.clone(),
                    status: SecretStatus::Available,
                    used_by_order_item: None,
                    used_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn next_available_secret(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<Option<CardSecret>> {
        Ok(self
            .working
            .secrets
            .values()
            .find(|secret| {
                secret.product_id == product_id
                    && secret.sku_id == sku_id
                    && secret.status == SecretStatus::Available
            })
            .cloned())
    }

    async fn claim_secret(
        &mut self,
        secret_id: SecretId,
        order_item_id: Option<OrderItemId>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.pause().await;
        let lost_race = self.take_claim_loss();
        let Some(secret) = self.working.secrets.get_mut(&secret_id) else {
            return Ok(false);
        };
        if secret.status != SecretStatus::Available {
            return Ok(false);
        }
        secret.status = SecretStatus::Used;
        secret.used_at = Some(now);
        secret.updated_at = now;
        if lost_race {
            secret.used_by_order_item = None;
            return Ok(false);
        }
        secret.used_by_order_item = order_item_id;
        Ok(true)
    }

    async fn disable_secret(&mut self, secret_id: SecretId, now: DateTime<Utc>) -> Result<bool> {
        self.pause().await;
        match self.working.secrets.get_mut(&secret_id) {
            Some(secret) if secret.status == SecretStatus::Available => {
                secret.status = SecretStatus::Disabled;
                secret.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn secret(&mut self, secret_id: SecretId) -> Result<Option<CardSecret>> {
        Ok(self.working.secrets.get(&secret_id).cloned())
    }

    async fn count_available_secrets(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<u64> {
        let count = self
            .working
            .secrets
            .values()
            .filter(|secret| {
                secret.product_id == product_id
                    && secret.sku_id == sku_id
                    && secret.status == SecretStatus::Available
            })
            .count();
        Ok(count as u64)
    }
}

impl OrderRepository for MemoryTx {
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn set_order_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        self.pause().await;
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        order.status = status;
        Ok(())
    }

    async fn set_stock_reserved(
        &mut self,
        order_id: OrderId,
        reserved: bool,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        self.pause().await;
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        order.stock_reserved = reserved;
        Ok(())
    }

    async fn fulfillment_for_item(
        &mut self,
        order_item_id: OrderItemId,
    ) -> Result<Option<Fulfillment>> {
        Ok(self
            .working
            .fulfillments
            .values()
            .find(|fulfillment| fulfillment.order_item_id == order_item_id)
            .cloned())
    }

    async fn insert_fulfillment(&mut self, fulfillment: NewFulfillment) -> Result<Fulfillment> {
        self.pause().await;
        let state = &mut self.working;
        if state
            .fulfillments
            .values()
            .any(|existing| existing.order_item_id == fulfillment.order_item_id)
        {
            return Err(unique_violation("uq_fulfillments_order_item"));
        }
        let row = Fulfillment {
            id: FulfillmentId::new(next_id(&state.fulfillments, FulfillmentId::get)),
            order_id: fulfillment.order_id,
            order_item_id: fulfillment.order_item_id,
            content: fulfillment.content,
            delivered_at: fulfillment.delivered_at,
        };
        state.fulfillments.insert(row.id, row.clone());
        Ok(row)
    }
}

impl CartRepository for MemoryTx {
    async fn cart_items(&mut self, user_id: UserId) -> Result<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self
            .working
            .cart
            .values()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.created_at, item.product_id, item.sku_id));
        Ok(items)
    }

    async fn upsert_cart_item(&mut self, item: CartItem) -> Result<()> {
        self.pause().await;
        let key = (item.user_id, item.product_id, item.sku_id);
        if let Some(existing) = self.working.cart.get_mut(&key) {
            existing.quantity = item.quantity;
            existing.fulfillment_mode = item.fulfillment_mode;
            existing.updated_at = item.updated_at;
            return Ok(());
        }
        self.working.check_cart_indexes(&item)?;
        self.working.cart.insert(key, item);
        Ok(())
    }

    async fn delete_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        sku_id: SkuId,
    ) -> Result<bool> {
        self.pause().await;
        Ok(self
            .working
            .cart
            .remove(&(user_id, product_id, sku_id))
            .is_some())
    }
}

impl MigrationRepository for MemoryTx {
    async fn products_without_skus(&mut self) -> Result<Vec<ProductId>> {
        let with_skus: HashSet<ProductId> =
            self.working.skus.values().map(|sku| sku.product_id).collect();
        Ok(self
            .working
            .products
            .keys()
            .filter(|id| !with_skus.contains(id))
            .copied()
            .collect())
    }

    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&product_id).cloned())
    }

    async fn reassign_legacy_rows(
        &mut self,
        product_id: ProductId,
        sku_id: SkuId,
        now: DateTime<Utc>,
    ) -> Result<ReassignedRows> {
        self.pause().await;
        let state = &mut self.working;
        let mut rows = ReassignedRows::default();

        for item in state.order_items.values_mut() {
            if item.product_id == product_id && item.sku_id.is_legacy() {
                item.sku_id = sku_id;
                rows.order_items += 1;
            }
        }

        let legacy_keys: Vec<CartKey> = state
            .cart
            .keys()
            .filter(|(_, product, sku)| *product == product_id && sku.is_legacy())
            .copied()
            .collect();
        for key in legacy_keys {
            if let Some(mut item) = state.cart.remove(&key) {
                item.sku_id = sku_id;
                item.updated_at = now;
                state.cart.insert((item.user_id, item.product_id, sku_id), item);
                rows.cart_items += 1;
            }
        }

        for batch in state.batches.values_mut() {
            if batch.product_id == product_id && batch.sku_id.is_legacy() {
                batch.sku_id = sku_id;
                rows.secret_batches += 1;
            }
        }

        for secret in state.secrets.values_mut() {
            if secret.product_id == product_id && secret.sku_id.is_legacy() {
                secret.sku_id = sku_id;
                secret.updated_at = now;
                rows.secrets += 1;
            }
        }

        Ok(rows)
    }

    async fn cart_unique_indexes(&mut self) -> Result<Vec<IndexInfo>> {
        Ok(self.working.cart_indexes.clone())
    }

    async fn drop_cart_index(&mut self, name: &str) -> Result<()> {
        self.pause().await;
        let before = self.working.cart_indexes.len();
        self.working.cart_indexes.retain(|index| index.name != name);
        if self.working.cart_indexes.len() == before {
            return Err(FulfillmentError::DatabaseError(format!(
                "index \"{name}\" does not exist"
            )));
        }
        Ok(())
    }

    async fn create_cart_unique_index(&mut self, name: &str, columns: &[&str]) -> Result<()> {
        self.pause().await;
        if self.working.cart_indexes.iter().any(|index| index.name == name) {
            return Ok(());
        }
        let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
        let mut seen = HashSet::new();
        for item in self.working.cart.values() {
            if !seen.insert(index_key(item, &columns)) {
                return Err(FulfillmentError::DatabaseError(format!(
                    "could not create unique index \"{name}\": duplicate key"
                )));
            }
        }
        self.working.cart_indexes.push(IndexInfo {
            name: name.to_string(),
            columns,
        });
        Ok(())
    }
}
