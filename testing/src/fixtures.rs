//! Row builders with sensible defaults, timestamped at [`test_clock`](crate::test_clock).

use crate::mocks::test_clock;
use rust_decimal::Decimal;
use skufill_core::environment::Clock;
use skufill_core::ledger::StockCounters;
use skufill_core::types::{
    BatchId, CardSecret, CartItem, FulfillmentMode, Order, OrderId, OrderItem, OrderItemId,
    OrderStatus, Product, ProductId, ProductSku, SecretBatch, SecretId, SecretSource,
    SecretStatus, SkuId, UserId,
};

/// Active product priced at 10.00 with empty legacy stock.
#[must_use]
pub fn product(id: i64, mode: FulfillmentMode) -> Product {
    Product {
        id: ProductId::new(id),
        slug: format!("product-{id}"),
        price_amount: Decimal::new(1000, 2),
        fulfillment_mode: mode,
        legacy_stock: StockCounters::default(),
        is_active: true,
    }
}

/// Pre-SKU product carrying its own price and counters.
#[must_use]
pub fn legacy_product(
    id: i64,
    mode: FulfillmentMode,
    price_amount: Decimal,
    stock: StockCounters,
) -> Product {
    Product {
        price_amount,
        legacy_stock: stock,
        ..product(id, mode)
    }
}

/// Active SKU priced at 10.00.
#[must_use]
pub fn sku(id: i64, product_id: i64, code: &str, stock: StockCounters) -> ProductSku {
    let now = test_clock().now();
    ProductSku {
        id: SkuId::new(id),
        product_id: ProductId::new(product_id),
        code: code.to_string(),
        price_amount: Decimal::new(1000, 2),
        stock,
        is_active: true,
        sort_order: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Same as [`sku`] but inactive.
#[must_use]
pub fn inactive_sku(id: i64, product_id: i64, code: &str) -> ProductSku {
    ProductSku {
        is_active: false,
        ..sku(id, product_id, code, StockCounters::default())
    }
}

/// Available secret without a batch.
#[must_use]
pub fn secret(id: i64, product_id: i64, sku_id: i64, payload: &str) -> CardSecret {
    let now = test_clock().now();
    CardSecret {
        id: SecretId::new(id),
        product_id: ProductId::new(product_id),
        sku_id: SkuId::new(sku_id),
        batch_id: None,
        secret: payload.to_string(),
        status: SecretStatus::Available,
        used_by_order_item: None,
        used_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Manually entered batch.
#[must_use]
pub fn batch(
    id: i64,
    product_id: i64,
    sku_id: i64,
    batch_no: &str,
    total_count: u32,
) -> SecretBatch {
    SecretBatch {
        id: BatchId::new(id),
        product_id: ProductId::new(product_id),
        sku_id: SkuId::new(sku_id),
        batch_no: batch_no.to_string(),
        source: SecretSource::Manual,
        total_count,
        created_at: test_clock().now(),
    }
}

/// Order of user 1 in the given status, with no stock reserved.
#[must_use]
pub fn order(id: i64, status: OrderStatus) -> Order {
    Order {
        id: OrderId::new(id),
        order_no: format!("ORD-{id:06}"),
        user_id: UserId::new(1),
        status,
        stock_reserved: false,
    }
}

/// Order whose manual items already hold reserved stock.
#[must_use]
pub fn reserved_order(id: i64, status: OrderStatus) -> Order {
    Order {
        stock_reserved: true,
        ..order(id, status)
    }
}

/// Order line priced at 10.00 per unit.
#[must_use]
pub fn order_item(
    id: i64,
    order_id: i64,
    product_id: i64,
    sku_id: i64,
    quantity: u32,
    mode: FulfillmentMode,
) -> OrderItem {
    OrderItem {
        id: OrderItemId::new(id),
        order_id: OrderId::new(order_id),
        product_id: ProductId::new(product_id),
        sku_id: SkuId::new(sku_id),
        quantity,
        unit_price: Decimal::new(1000, 2),
        fulfillment_mode: mode,
    }
}

/// Cart line.
#[must_use]
pub fn cart_item(user_id: i64, product_id: i64, sku_id: i64, quantity: u32) -> CartItem {
    let now = test_clock().now();
    CartItem {
        user_id: UserId::new(user_id),
        product_id: ProductId::new(product_id),
        sku_id: SkuId::new(sku_id),
        quantity,
        fulfillment_mode: FulfillmentMode::Manual,
        created_at: now,
        updated_at: now,
    }
}
