//! SKU-aware cart lines and availability.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use rust_decimal::Decimal;
use skufill_core::{
    CartService, FulfillmentError, FulfillmentMode, InventoryView, Product, ProductId,
    ProductSku, SecretStatus, SkuId, StockCounters, UserId,
};
use skufill_testing::{MemoryState, MemoryStore, fixtures, test_clock};
use std::sync::Arc;

const USER: UserId = UserId::new(7);

fn catalog(s: &mut MemoryState) {
    // manual product with two priced variants
    s.add_product(fixtures::product(10, FulfillmentMode::Manual));
    s.add_sku(ProductSku {
        price_amount: Decimal::new(2550, 2),
        ..fixtures::sku(101, 10, "SMALL", StockCounters::new(10, 2, 3))
    });
    s.add_sku(ProductSku {
        price_amount: Decimal::new(4000, 2),
        ..fixtures::sku(102, 10, "LARGE", StockCounters::with_total(4))
    });

    // auto product with a single active variant
    s.add_product(fixtures::product(20, FulfillmentMode::Auto));
    s.add_sku(fixtures::sku(201, 20, "MONTH", StockCounters::default()));
    s.add_sku(fixtures::inactive_sku(202, 20, "YEAR"));
    for (id, payload) in [(1, "A"), (2, "B"), (3, "C"), (4, "D")] {
        s.add_secret(fixtures::secret(id, 20, 201, payload));
    }
    let mut used = fixtures::secret(5, 20, 201, "E");
    used.status = SecretStatus::Used;
    s.add_secret(used);

    s.add_product(Product {
        is_active: false,
        ..fixtures::product(30, FulfillmentMode::Manual)
    });
    s.add_sku(fixtures::sku(301, 30, "ONLY", StockCounters::with_total(5)));
}

async fn setup() -> (Arc<MemoryStore>, CartService<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.with_state(catalog).await;
    let cart = CartService::new(Arc::clone(&store), test_clock().shared());
    (store, cart)
}

#[tokio::test]
async fn upsert_keys_lines_by_sku() {
    let (store, cart) = setup().await;

    cart.upsert_item(USER, ProductId::new(10), SkuId::new(101), 1).await.unwrap();
    cart.upsert_item(USER, ProductId::new(10), SkuId::new(102), 2).await.unwrap();
    cart.upsert_item(USER, ProductId::new(10), SkuId::new(101), 4).await.unwrap();

    let state = store.snapshot().await;
    let mut lines: Vec<(i64, u32)> = state
        .cart_lines()
        .map(|line| (line.sku_id.get(), line.quantity))
        .collect();
    lines.sort_unstable();
    assert_eq!(lines, vec![(101, 4), (102, 2)]);
}

#[tokio::test]
async fn upsert_resolves_single_active_sku() {
    let (_, cart) = setup().await;

    let item = cart
        .upsert_item(USER, ProductId::new(20), SkuId::LEGACY, 1)
        .await
        .unwrap();
    assert_eq!(item.sku_id, SkuId::new(201));
    assert_eq!(item.fulfillment_mode, FulfillmentMode::Auto);
}

#[tokio::test]
async fn upsert_rejects_what_cannot_be_bought() {
    let (_, cart) = setup().await;

    let zero = cart.upsert_item(USER, ProductId::new(10), SkuId::new(101), 0).await;
    assert!(matches!(zero, Err(FulfillmentError::InvalidQuantity)));

    let ambiguous = cart.upsert_item(USER, ProductId::new(10), SkuId::LEGACY, 1).await;
    assert!(matches!(
        ambiguous,
        Err(FulfillmentError::SkuRequired { active_skus: 2, .. })
    ));

    let foreign = cart.upsert_item(USER, ProductId::new(10), SkuId::new(201), 1).await;
    assert!(matches!(foreign, Err(FulfillmentError::SkuInvalid { .. })));

    let inactive_sku = cart.upsert_item(USER, ProductId::new(20), SkuId::new(202), 1).await;
    assert!(matches!(inactive_sku, Err(FulfillmentError::SkuInvalid { .. })));

    let inactive_product = cart.upsert_item(USER, ProductId::new(30), SkuId::new(301), 1).await;
    assert!(matches!(
        inactive_product,
        Err(FulfillmentError::ProductUnavailable(id)) if id == ProductId::new(30)
    ));

    let too_many = cart.upsert_item(USER, ProductId::new(10), SkuId::new(101), 6).await;
    assert!(matches!(
        too_many,
        Err(FulfillmentError::InsufficientStock {
            requested: 6,
            available: 5,
            ..
        })
    ));
}

#[tokio::test]
async fn remove_reports_whether_line_existed() {
    let (_, cart) = setup().await;
    cart.upsert_item(USER, ProductId::new(10), SkuId::new(102), 1).await.unwrap();

    assert!(cart.remove_item(USER, ProductId::new(10), SkuId::new(102)).await.unwrap());
    assert!(!cart.remove_item(USER, ProductId::new(10), SkuId::new(102)).await.unwrap());
    assert!(cart.list(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn list_prices_lines_at_their_sku() {
    let (_, cart) = setup().await;
    cart.upsert_item(USER, ProductId::new(10), SkuId::new(101), 2).await.unwrap();
    cart.upsert_item(USER, ProductId::new(10), SkuId::new(102), 1).await.unwrap();
    cart.upsert_item(USER, ProductId::new(20), SkuId::new(201), 3).await.unwrap();

    let lines = cart.list(USER).await.unwrap();
    let totals: Vec<(i64, Decimal, Decimal)> = lines
        .iter()
        .map(|line| (line.sku.id.get(), line.unit_price, line.line_total))
        .collect();
    assert!(totals.contains(&(101, Decimal::new(2550, 2), Decimal::new(5100, 2))));
    assert!(totals.contains(&(102, Decimal::new(4000, 2), Decimal::new(4000, 2))));
    assert!(totals.contains(&(201, Decimal::new(1000, 2), Decimal::new(3000, 2))));
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn list_prunes_stale_lines() {
    let (store, cart) = setup().await;
    store
        .with_state(|s| {
            s.add_cart_item(fixtures::cart_item(7, 10, 101, 1));
            // product deactivated after the line was added
            s.add_cart_item(fixtures::cart_item(7, 30, 301, 1));
            // variant withdrawn
            s.add_cart_item(fixtures::cart_item(7, 20, 202, 1));
            // sold out
            s.add_sku(fixtures::sku(103, 10, "MEDIUM", StockCounters::new(3, 1, 2)));
            s.add_cart_item(fixtures::cart_item(7, 10, 103, 1));
            // someone else's cart stays untouched
            s.add_cart_item(fixtures::cart_item(8, 30, 301, 1));
        })
        .await;

    let lines = cart.list(USER).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].sku.id, SkuId::new(101));

    let state = store.snapshot().await;
    let remaining: Vec<(i64, i64)> = state
        .cart_lines()
        .map(|line| (line.user_id.get(), line.sku_id.get()))
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&(7, 101)));
    assert!(remaining.contains(&(8, 301)));
}

#[tokio::test]
async fn list_reports_current_fulfillment_mode() {
    let (store, cart) = setup().await;
    // line stored while the product was still manual
    store
        .with_state(|s| s.add_cart_item(fixtures::cart_item(7, 20, 201, 1)))
        .await;

    let lines = cart.list(USER).await.unwrap();
    assert_eq!(lines[0].item.fulfillment_mode, FulfillmentMode::Auto);
}

#[tokio::test]
async fn availability_per_mode() {
    let (store, _) = setup().await;
    let view = InventoryView::new(Arc::clone(&store));

    let manual = view
        .availability(ProductId::new(10), SkuId::new(101))
        .await
        .unwrap();
    assert_eq!(manual.mode, FulfillmentMode::Manual);
    assert_eq!(manual.available, 5);

    let auto = view
        .availability(ProductId::new(20), SkuId::LEGACY)
        .await
        .unwrap();
    assert_eq!(auto.sku_id, SkuId::new(201));
    assert_eq!(auto.mode, FulfillmentMode::Auto);
    assert_eq!(auto.available, 4);

    let missing = view.availability(ProductId::new(99), SkuId::LEGACY).await;
    assert!(matches!(missing, Err(FulfillmentError::ProductUnavailable(_))));
}
