//! Runtime for the skufill fulfillment engine.
//!
//! This crate wires the engine together for a deployment:
//! - [`config`]: environment-based configuration
//! - [`telemetry`]: `tracing` subscriber and Prometheus metrics
//! - [`engine`]: schema, legacy migration, and the services built on one store
//!
//! The `skufill-migrate` binary runs the startup sequence once and exits.
//!
//! # Example
//!
//! ```ignore
//! use skufill_runtime::{Config, Engine};
//!
//! let config = Config::from_env()?;
//! let engine = Engine::bootstrap(&config).await?;
//! let delivered = engine.fulfill_order(order_id).await?;
//! ```

pub mod config;
pub mod engine;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use engine::Engine;
pub use telemetry::{MetricsServer, TelemetryError, init_tracing};
