//! # Skufill Testing
//!
//! Test doubles and helpers for the skufill engine.
//!
//! This crate provides:
//! - [`MemoryStore`]: a serializable in-memory [`Store`](skufill_core::Store)
//! - [`FixedClock`]: deterministic time
//! - [`fixtures`]: builders for catalog, order and secret rows
//! - [`properties`]: proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use skufill_testing::{MemoryStore, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn reserve_until_empty() {
//!     let store = Arc::new(MemoryStore::new());
//!     store.with_state(|s| {
//!         s.add_product(fixtures::product(100, FulfillmentMode::Manual));
//!         s.add_sku(fixtures::sku(1001, 100, "A", StockCounters::with_total(2)));
//!     }).await;
//!
//!     let ledger = StockLedger::new(store, Arc::new(test_clock()));
//!     ledger.reserve(SkuId::new(1001), 2).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod memory;

use chrono::{DateTime, Utc};
use skufill_core::environment::Clock;

/// Mock implementations of injected dependencies.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Arc;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use skufill_testing::mocks::FixedClock;
    /// use skufill_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Shareable handle, as services take `Arc<dyn Clock>`.
        #[must_use]
        pub fn shared(self) -> Arc<dyn Clock> {
            Arc::new(self)
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use skufill_core::StockCounters;

    /// Counters that satisfy `total >= locked + sold`.
    pub fn consistent_counters(max_total: u32) -> impl Strategy<Value = StockCounters> {
        (0..=max_total)
            .prop_flat_map(|total| (Just(total), 0..=total))
            .prop_flat_map(|(total, committed)| (Just(total), Just(committed), 0..=committed))
            .prop_map(|(total, committed, locked)| {
                StockCounters::new(total, locked, committed - locked)
            })
    }

    /// Secret payloads as an importer would paste them: padded, with blanks and repeats.
    pub fn raw_payloads() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop_oneof![
                "[A-Z0-9]{4,8}",
                " [A-Z0-9]{4,8}  ",
                Just(String::new()),
                Just("   ".to_string()),
            ],
            0..24,
        )
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything. The filter
/// comes from `RUST_LOG` and defaults to `skufill_core=debug`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("skufill_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use memory::{MemoryState, MemoryStore, MemoryTx};
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
