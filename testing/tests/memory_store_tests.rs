//! Tests for the in-memory store's transaction and constraint emulation.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use skufill_core::store::{
    CartRepository, CatalogRepository, MigrationRepository, SecretRepository, StockRepository,
    Store, UnitOfWork,
};
use skufill_core::types::{FulfillmentMode, OrderItemId, ProductId, SecretId, SkuId};
use skufill_core::{Clock, FulfillmentError, StockCounters};
use skufill_testing::{MemoryStore, fixtures, test_clock};

#[tokio::test]
async fn dropped_unit_of_work_rolls_back() {
    let store = MemoryStore::new();
    store
        .with_state(|s| s.add_sku(fixtures::sku(1, 10, "A", StockCounters::with_total(5))))
        .await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.store_stock(SkuId::new(1), StockCounters::new(5, 2, 0), test_clock().now())
            .await
            .unwrap();
    }
    let state = store.snapshot().await;
    assert_eq!(state.sku(SkuId::new(1)).unwrap().stock, StockCounters::with_total(5));

    let mut tx = store.begin().await.unwrap();
    tx.store_stock(SkuId::new(1), StockCounters::new(5, 2, 0), test_clock().now())
        .await
        .unwrap();
    tx.commit().await.unwrap();
    let state = store.snapshot().await;
    assert_eq!(state.sku(SkuId::new(1)).unwrap().stock, StockCounters::new(5, 2, 0));
}

#[tokio::test]
async fn sku_code_is_unique_per_product() {
    let store = MemoryStore::new();
    store
        .with_state(|s| s.add_sku(fixtures::sku(1, 10, "DEFAULT", StockCounters::default())))
        .await;

    let mut tx = store.begin().await.unwrap();
    let duplicate = fixtures::sku(0, 10, "DEFAULT", StockCounters::default());
    let result = tx
        .insert_sku(
            skufill_core::NewSku {
                product_id: duplicate.product_id,
                code: duplicate.code,
                price_amount: duplicate.price_amount,
                stock: duplicate.stock,
                is_active: true,
                sort_order: 0,
            },
            test_clock().now(),
        )
        .await;
    assert!(result.is_err());

    let other_product = tx
        .insert_sku(
            skufill_core::NewSku {
                product_id: ProductId::new(11),
                code: "DEFAULT".to_string(),
                price_amount: rust_decimal::Decimal::ONE,
                stock: StockCounters::default(),
                is_active: true,
                sort_order: 0,
            },
            test_clock().now(),
        )
        .await
        .unwrap();
    assert_eq!(other_product.id, SkuId::new(2));
}

#[tokio::test]
async fn lost_claims_leave_secret_taken_by_competitor() {
    let store = MemoryStore::new();
    store
        .with_state(|s| {
            s.add_secret(fixtures::secret(1, 10, 1, "A"));
            s.add_secret(fixtures::secret(2, 10, 1, "B"));
        })
        .await;
    store.lose_next_claims(1);

    let mut tx = store.begin().await.unwrap();
    let now = test_clock().now();
    assert!(!tx.claim_secret(SecretId::new(1), Some(OrderItemId::new(7)), now).await.unwrap());
    assert!(tx.claim_secret(SecretId::new(2), Some(OrderItemId::new(7)), now).await.unwrap());
    assert_eq!(
        tx.count_available_secrets(ProductId::new(10), SkuId::new(1))
            .await
            .unwrap(),
        0
    );
    tx.commit().await.unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.secret(SecretId::new(1)).unwrap().used_by_order_item, None);
    assert_eq!(
        state.secret(SecretId::new(2)).unwrap().used_by_order_item,
        Some(OrderItemId::new(7))
    );
}

#[tokio::test]
async fn legacy_cart_index_rejects_second_sku() {
    let store = MemoryStore::legacy();
    store
        .with_state(|s| s.add_cart_item(fixtures::cart_item(1, 10, 100, 1)))
        .await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .upsert_cart_item(fixtures::cart_item(1, 10, 101, 1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("idx_cart_user_product"));

    tx.upsert_cart_item(fixtures::cart_item(1, 10, 100, 4))
        .await
        .unwrap();
    let items = tx.cart_items(skufill_core::UserId::new(1)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 4);

    let indexes = tx.cart_unique_indexes().await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].columns, vec!["user_id", "product_id"]);
}

#[tokio::test]
async fn products_without_skus_lists_unmigrated_only() {
    let store = MemoryStore::new();
    store
        .with_state(|s| {
            s.add_product(fixtures::product(10, FulfillmentMode::Manual));
            s.add_product(fixtures::product(11, FulfillmentMode::Auto));
            s.add_sku(fixtures::sku(1, 11, "A", StockCounters::default()));
        })
        .await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.products_without_skus().await.unwrap(), vec![ProductId::new(10)]);
    assert_eq!(
        tx.skus_for_product(ProductId::new(11), true).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn existing_payload_is_reported_as_duplicate_secret() {
    let store = MemoryStore::new();
    store
        .with_state(|s| s.add_secret(fixtures::secret(1, 10, 1, "CARD-001")))
        .await;

    let mut tx = store.begin().await.unwrap();
    let batch = fixtures::batch(1, 10, 1, "IMPORT-1", 2);
    let err = tx
        .insert_secrets(
            &batch,
            &["CARD-002".to_string(), "CARD-001".to_string()],
            test_clock().now(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::DuplicateSecret {
            payloads: vec!["CARD-001".to_string()],
        }
    );
}
