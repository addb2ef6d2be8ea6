//! Connection pool settings.

use crate::database_error;
use skufill_core::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// How to reach the database and size the pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Connection string
    pub database_url: String,
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long [`skufill_core::Store::begin`] waits for a free connection
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Defaults: 10 connections at most, none kept idle, 5s acquire timeout.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Set the maximum pool size.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the number of idle connections to keep.
    #[must_use]
    pub const fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Open the pool.
    ///
    /// # Errors
    ///
    /// Returns [`skufill_core::FulfillmentError::DatabaseError`] if the first connection
    /// cannot be established.
    pub async fn connect(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await
            .map_err(database_error)
    }
}
