//! Stock ledger behaviour against the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use skufill_core::{FulfillmentError, SkuId, StockCounters, StockLedger, with_deadline};
use skufill_testing::{MemoryStore, fixtures, test_clock};
use std::sync::Arc;
use std::time::Duration;

const SKU: SkuId = SkuId::new(1001);

async fn ledger_with(counters: StockCounters) -> (Arc<MemoryStore>, StockLedger<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .with_state(|s| s.add_sku(fixtures::sku(1001, 100, "A", counters)))
        .await;
    let ledger = StockLedger::new(Arc::clone(&store), test_clock().shared());
    (store, ledger)
}

#[tokio::test]
async fn reserve_respects_available_stock() {
    let (_, ledger) = ledger_with(StockCounters::new(20, 3, 5)).await;

    let counters = ledger.reserve(SKU, 12).await.unwrap();
    assert_eq!(counters, StockCounters::new(20, 15, 5));

    let err = ledger.reserve(SKU, 1).await.unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::InsufficientStock {
            sku_id: SKU,
            requested: 1,
            available: 0,
        }
    );
    assert!(err.is_recoverable());
    assert_eq!(ledger.counters(SKU).await.unwrap(), StockCounters::new(20, 15, 5));
}

#[tokio::test]
async fn commit_and_release_move_locked_units() {
    let (_, ledger) = ledger_with(StockCounters::with_total(10)).await;
    ledger.reserve(SKU, 6).await.unwrap();

    assert_eq!(ledger.commit(SKU, 4).await.unwrap(), StockCounters::new(10, 2, 4));
    assert_eq!(ledger.release(SKU, 2).await.unwrap(), StockCounters::new(10, 0, 4));

    assert!(matches!(
        ledger.commit(SKU, 1).await,
        Err(FulfillmentError::InvalidState(_))
    ));
    assert!(matches!(
        ledger.release(SKU, 1).await,
        Err(FulfillmentError::InvalidState(_))
    ));
    assert_eq!(ledger.counters(SKU).await.unwrap().available(), 6);
}

#[tokio::test]
async fn resize_keeps_committed_units() {
    let (_, ledger) = ledger_with(StockCounters::new(10, 3, 4)).await;

    assert_eq!(ledger.resize(SKU, 7).await.unwrap(), StockCounters::new(7, 3, 4));
    assert!(matches!(
        ledger.resize(SKU, 6).await,
        Err(FulfillmentError::InvalidState(_))
    ));
    assert_eq!(ledger.resize(SKU, 50).await.unwrap().available(), 43);
}

#[tokio::test]
async fn zero_quantity_and_unknown_sku_are_rejected() {
    let (_, ledger) = ledger_with(StockCounters::with_total(10)).await;

    assert_eq!(ledger.reserve(SKU, 0).await, Err(FulfillmentError::InvalidQuantity));
    assert_eq!(ledger.commit(SKU, 0).await, Err(FulfillmentError::InvalidQuantity));
    assert!(matches!(
        ledger.reserve(SkuId::new(9999), 1).await,
        Err(FulfillmentError::InvalidState(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let (store, ledger) = ledger_with(StockCounters::new(25, 0, 5)).await;

    let tasks: Vec<_> = (0..60)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve(SKU, 1).await })
        })
        .collect();

    let mut granted = 0;
    let mut rejected = 0;
    for joined in futures::future::join_all(tasks).await {
        let outcome = joined.unwrap();
        assert!(
            matches!(outcome, Ok(_) | Err(FulfillmentError::InsufficientStock { .. })),
            "{outcome:?}"
        );
        if outcome.is_ok() {
            granted += 1;
        } else {
            rejected += 1;
        }
    }

    assert_eq!(granted, 20);
    assert_eq!(rejected, 40);
    let state = store.snapshot().await;
    let counters = state.sku(SKU).unwrap().stock;
    assert_eq!(counters, StockCounters::new(25, 20, 5));
    assert!(counters.is_consistent());
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_leaves_no_partial_write() {
    let store = Arc::new(MemoryStore::new().with_write_latency(Duration::from_secs(5)));
    store
        .with_state(|s| s.add_sku(fixtures::sku(1001, 100, "A", StockCounters::with_total(10))))
        .await;
    let ledger = StockLedger::new(Arc::clone(&store), test_clock().shared());

    let deadline = Duration::from_millis(100);
    let outcome = with_deadline(deadline, ledger.reserve(SKU, 4)).await;
    assert_eq!(outcome, Err(FulfillmentError::Timeout(deadline)));

    let state = store.snapshot().await;
    assert_eq!(state.sku(SKU).unwrap().stock, StockCounters::with_total(10));
}
