//! # Skufill Core
//!
//! Inventory-aware fulfillment for products sold in variants (SKUs).
//!
//! Given a paid order line that references a SKU, the engine hands out exactly one
//! deliverable per unit: a unique secret from a finite pool for `auto` products, or a
//! decrement of a counted stock quota for `manual` products. Concurrent completions of the
//! same order never deliver twice, and concurrent buyers of the same SKU never oversell.
//!
//! ## Components
//!
//! - [`ledger`]: `total >= locked + sold` per SKU, one row-locked update per operation
//! - [`secrets`]: card secret ingestion and optimistic, SKU-scoped allocation
//! - [`resolver`]: concrete SKU for a product plus an optional SKU id
//! - [`fulfillment`]: per-item units of work turning paid orders into fulfillments
//! - [`migration`]: idempotent backfill of legacy single-SKU products
//! - [`cart`] and [`inventory`]: SKU-aware cart lines and availability
//!
//! Every component is constructed with an injected `Arc<S>` where `S: `[`Store`]; there
//! is no global connection.
//!
//! ## Example
//!
//! ```ignore
//! use skufill_core::{FulfillmentService, RetryPolicy, SystemClock};
//! use std::sync::Arc;
//!
//! let service = FulfillmentService::new(store, Arc::new(SystemClock), RetryPolicy::default());
//! let outcome = service.create_auto(order_id).await?;
//! for fulfillment in &outcome.fulfillments {
//!     println!("{}: {:?}", fulfillment.order_item_id, fulfillment.content);
//! }
//! ```

pub mod cart;
pub mod deadline;
pub mod environment;
pub mod error;
pub mod fulfillment;
pub mod inventory;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod resolver;
pub mod retry;
pub mod secrets;
pub mod store;
pub mod types;

pub use cart::{CartLine, CartService};
pub use deadline::with_deadline;
pub use environment::{Clock, SystemClock};
pub use error::{FulfillmentError, Result};
pub use fulfillment::{FulfillmentService, OrderFulfillment};
pub use inventory::{Availability, InventoryView};
pub use ledger::{StockCounters, StockLedger};
pub use migration::{LegacyMigration, MigrationReport};
pub use resolver::{DEFAULT_SKU_CODE, SkuResolver};
pub use retry::RetryPolicy;
pub use secrets::{IngestReport, IngestRequest, SecretPool};
pub use store::{Store, UnitOfWork};
pub use types::*;
