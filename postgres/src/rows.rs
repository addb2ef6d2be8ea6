//! Row types as sqlx decodes them, and their conversion into domain types.
//!
//! Counters and quantities are `BIGINT` columns; anything that does not fit a `u32` is
//! reported as corrupt state rather than truncated.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use skufill_core::ledger::StockCounters;
use skufill_core::{
    BatchId, CardSecret, CartItem, Fulfillment, FulfillmentContent, FulfillmentError,
    FulfillmentId, FulfillmentMode, Order, OrderId, OrderItem, OrderItemId, OrderStatus,
    Product, ProductId, ProductSku, Result, SecretBatch, SecretId, SecretSource, SecretStatus,
    SkuId, UserId,
};

pub(crate) const PRODUCT_COLUMNS: &str = "id, slug, price_amount, fulfillment_type, \
     manual_stock_total, manual_stock_locked, manual_stock_sold, is_active";

pub(crate) const SKU_COLUMNS: &str = "id, product_id, sku_code, price_amount, \
     manual_stock_total, manual_stock_locked, manual_stock_sold, is_active, sort_order, \
     created_at, updated_at";

pub(crate) const BATCH_COLUMNS: &str =
    "id, product_id, sku_id, batch_no, source, total_count, created_at";

pub(crate) const SECRET_COLUMNS: &str = "id, product_id, sku_id, batch_id, secret, status, \
     used_by_order_item, used_at, created_at, updated_at";

pub(crate) const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, product_id, sku_id, quantity, unit_price, fulfillment_type";

pub(crate) const CART_COLUMNS: &str =
    "user_id, product_id, sku_id, quantity, fulfillment_type, created_at, updated_at";

pub(crate) const FULFILLMENT_COLUMNS: &str =
    "id, order_id, order_item_id, fulfillment_type, payload, delivered_at";

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        FulfillmentError::InvalidState(format!("{column} out of range: {value}"))
    })
}

pub(crate) fn counters(total: i64, locked: i64, sold: i64) -> Result<StockCounters> {
    Ok(StockCounters::new(
        to_u32("manual_stock_total", total)?,
        to_u32("manual_stock_locked", locked)?,
        to_u32("manual_stock_sold", sold)?,
    ))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    slug: String,
    price_amount: Decimal,
    fulfillment_type: String,
    manual_stock_total: i64,
    manual_stock_locked: i64,
    manual_stock_sold: i64,
    is_active: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = FulfillmentError;

    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Self {
            id: ProductId::new(row.id),
            slug: row.slug,
            price_amount: row.price_amount,
            fulfillment_mode: FulfillmentMode::parse(&row.fulfillment_type)?,
            legacy_stock: counters(
                row.manual_stock_total,
                row.manual_stock_locked,
                row.manual_stock_sold,
            )?,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SkuRow {
    id: i64,
    product_id: i64,
    sku_code: String,
    price_amount: Decimal,
    manual_stock_total: i64,
    manual_stock_locked: i64,
    manual_stock_sold: i64,
    is_active: bool,
    sort_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SkuRow> for ProductSku {
    type Error = FulfillmentError;

    fn try_from(row: SkuRow) -> Result<Self> {
        Ok(Self {
            id: SkuId::new(row.id),
            product_id: ProductId::new(row.product_id),
            code: row.sku_code,
            price_amount: row.price_amount,
            stock: counters(
                row.manual_stock_total,
                row.manual_stock_locked,
                row.manual_stock_sold,
            )?,
            is_active: row.is_active,
            sort_order: row.sort_order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BatchRow {
    id: i64,
    product_id: i64,
    sku_id: i64,
    batch_no: String,
    source: String,
    total_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for SecretBatch {
    type Error = FulfillmentError;

    fn try_from(row: BatchRow) -> Result<Self> {
        Ok(Self {
            id: BatchId::new(row.id),
            product_id: ProductId::new(row.product_id),
            sku_id: SkuId::new(row.sku_id),
            batch_no: row.batch_no,
            source: SecretSource::parse(&row.source)?,
            total_count: to_u32("total_count", row.total_count)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SecretRow {
    id: i64,
    product_id: i64,
    sku_id: i64,
    batch_id: Option<i64>,
    secret: String,
    status: String,
    used_by_order_item: Option<i64>,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SecretRow> for CardSecret {
    type Error = FulfillmentError;

    fn try_from(row: SecretRow) -> Result<Self> {
        Ok(Self {
            id: SecretId::new(row.id),
            product_id: ProductId::new(row.product_id),
            sku_id: SkuId::new(row.sku_id),
            batch_id: row.batch_id.map(BatchId::new),
            secret: row.secret,
            status: SecretStatus::parse(&row.status)?,
            used_by_order_item: row.used_by_order_item.map(OrderItemId::new),
            used_at: row.used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    id: i64,
    order_no: String,
    user_id: i64,
    status: String,
    stock_reserved: bool,
}

impl TryFrom<OrderRow> for Order {
    type Error = FulfillmentError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Self {
            id: OrderId::new(row.id),
            order_no: row.order_no,
            user_id: UserId::new(row.user_id),
            status: OrderStatus::parse(&row.status)?,
            stock_reserved: row.stock_reserved,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    sku_id: i64,
    quantity: i64,
    unit_price: Decimal,
    fulfillment_type: String,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = FulfillmentError;

    fn try_from(row: OrderItemRow) -> Result<Self> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            sku_id: SkuId::new(row.sku_id),
            quantity: to_u32("quantity", row.quantity)?,
            unit_price: row.unit_price,
            fulfillment_mode: FulfillmentMode::parse(&row.fulfillment_type)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CartRow {
    user_id: i64,
    product_id: i64,
    sku_id: i64,
    quantity: i64,
    fulfillment_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for CartItem {
    type Error = FulfillmentError;

    fn try_from(row: CartRow) -> Result<Self> {
        Ok(Self {
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            sku_id: SkuId::new(row.sku_id),
            quantity: to_u32("quantity", row.quantity)?,
            fulfillment_mode: FulfillmentMode::parse(&row.fulfillment_type)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FulfillmentRow {
    id: i64,
    order_id: i64,
    order_item_id: i64,
    fulfillment_type: String,
    payload: Option<String>,
    delivered_at: DateTime<Utc>,
}

impl TryFrom<FulfillmentRow> for Fulfillment {
    type Error = FulfillmentError;

    fn try_from(row: FulfillmentRow) -> Result<Self> {
        let mode = FulfillmentMode::parse(&row.fulfillment_type)?;
        Ok(Self {
            id: FulfillmentId::new(row.id),
            order_id: OrderId::new(row.order_id),
            order_item_id: OrderItemId::new(row.order_item_id),
            content: FulfillmentContent::from_stored(mode, row.payload.as_deref())?,
            delivered_at: row.delivered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct IndexRow {
    pub(crate) name: String,
    pub(crate) columns: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;

    #[test]
    fn negative_counters_are_rejected() {
        assert!(counters(-1, 0, 0).is_err());
        assert!(counters(i64::from(u32::MAX) + 1, 0, 0).is_err());
        assert_eq!(counters(20, 3, 5).unwrap(), StockCounters::new(20, 3, 5));
    }

    #[test]
    fn auto_fulfillment_row_keeps_secrets_in_order() {
        let now = Utc::now();
        let row = FulfillmentRow {
            id: 1,
            order_id: 2,
            order_item_id: 3,
            fulfillment_type: "auto".to_string(),
            payload: Some("A\nB".to_string()),
            delivered_at: now,
        };
        let fulfillment = Fulfillment::try_from(row).unwrap();
        assert_eq!(
            fulfillment.content,
            FulfillmentContent::Auto(vec!["A".to_string(), "B".to_string()])
        );
    }
}
