//! `PostgreSQL` store for the skufill fulfillment engine.
//!
//! [`PostgresStore`] implements [`skufill_core::Store`] over a sqlx connection pool. Each
//! unit of work is a `READ COMMITTED` transaction:
//!
//! - stock counters and orders are read with `SELECT ... FOR UPDATE`, so concurrent
//!   reservations and completions on the same row serialize
//! - secrets are claimed with a conditional `UPDATE ... WHERE status = 'available'`, the
//!   compare-and-set the secret pool retries on
//! - dropping a unit of work rolls its transaction back
//!
//! [`SCHEMA`] creates the tables idempotently and adds the `sku_id` columns to databases
//! that predate SKUs.
//!
//! # Example
//!
//! ```ignore
//! use skufill_postgres::{PoolConfig, PostgresStore};
//!
//! let store = PostgresStore::connect(&PoolConfig::new("postgres://localhost/shop")).await?;
//! store.apply_schema().await?;
//! ```

mod config;
mod rows;
mod store;

pub use config::PoolConfig;
pub use store::{PgUnitOfWork, PostgresStore};

/// DDL applied by [`PostgresStore::apply_schema`].
pub const SCHEMA: &str = include_str!("../schema.sql");

use skufill_core::FulfillmentError;

/// Map a sqlx error into the engine's error type.
pub(crate) fn database_error(error: sqlx::Error) -> FulfillmentError {
    FulfillmentError::DatabaseError(error.to_string())
}
