//! SKU resolution rules.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use skufill_core::{FulfillmentError, FulfillmentMode, ProductId, SkuId, SkuResolver, StockCounters};
use skufill_testing::{MemoryStore, fixtures};
use std::sync::Arc;

const PRODUCT: ProductId = ProductId::new(100);

async fn resolver_with(
    seed: impl FnOnce(&mut skufill_testing::MemoryState),
) -> SkuResolver<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .with_state(|s| {
            s.add_product(fixtures::product(100, FulfillmentMode::Manual));
            s.add_product(fixtures::product(200, FulfillmentMode::Manual));
            seed(s);
        })
        .await;
    SkuResolver::new(store)
}

#[tokio::test]
async fn single_active_sku_is_the_fallback() {
    let resolver = resolver_with(|s| {
        s.add_sku(fixtures::sku(1001, 100, "A", StockCounters::default()));
        s.add_sku(fixtures::inactive_sku(1002, 100, "B"));
    })
    .await;

    let sku = resolver.resolve(PRODUCT, SkuId::LEGACY).await.unwrap();
    assert_eq!(sku.id, SkuId::new(1001));
}

#[tokio::test]
async fn several_active_skus_require_a_choice() {
    let resolver = resolver_with(|s| {
        s.add_sku(fixtures::sku(1001, 100, "A", StockCounters::default()));
        s.add_sku(fixtures::sku(1002, 100, "B", StockCounters::default()));
    })
    .await;

    let err = resolver.resolve(PRODUCT, SkuId::LEGACY).await.unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::SkuRequired {
            product_id: PRODUCT,
            active_skus: 2,
        }
    );
    assert!(err.is_client_error());
    assert_eq!(
        resolver.resolve(PRODUCT, SkuId::new(1002)).await.unwrap().code,
        "B"
    );
}

#[tokio::test]
async fn no_active_sku_is_invalid() {
    let resolver = resolver_with(|s| s.add_sku(fixtures::inactive_sku(1001, 100, "A"))).await;

    assert_eq!(
        resolver.resolve(PRODUCT, SkuId::LEGACY).await,
        Err(FulfillmentError::SkuInvalid {
            product_id: PRODUCT,
            sku_id: SkuId::LEGACY,
        })
    );
}

#[tokio::test]
async fn explicit_sku_must_be_active_and_owned() {
    let resolver = resolver_with(|s| {
        s.add_sku(fixtures::sku(1001, 100, "A", StockCounters::default()));
        s.add_sku(fixtures::inactive_sku(1002, 100, "B"));
        s.add_sku(fixtures::sku(2001, 200, "A", StockCounters::default()));
    })
    .await;

    for requested in [1002, 2001, 9999] {
        assert_eq!(
            resolver.resolve(PRODUCT, SkuId::new(requested)).await,
            Err(FulfillmentError::SkuInvalid {
                product_id: PRODUCT,
                sku_id: SkuId::new(requested),
            }),
            "sku {requested}"
        );
    }
    assert!(resolver.resolve(PRODUCT, SkuId::new(1001)).await.is_ok());
}

#[tokio::test]
async fn fallback_follows_sort_order() {
    let resolver = resolver_with(|s| {
        let mut late = fixtures::sku(1001, 100, "LATE", StockCounters::default());
        late.sort_order = 5;
        s.add_sku(late);
        s.add_sku(fixtures::inactive_sku(1000, 100, "EARLY"));
    })
    .await;

    assert_eq!(
        resolver.resolve(PRODUCT, SkuId::LEGACY).await.unwrap().code,
        "LATE"
    );
}
