//! Environment-based configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | required |
//! | `SKUFILL_DB_MAX_CONNECTIONS` | `10` |
//! | `SKUFILL_DB_MIN_CONNECTIONS` | `0` |
//! | `SKUFILL_DB_ACQUIRE_TIMEOUT_MS` | `5000` |
//! | `SKUFILL_OPERATION_TIMEOUT_MS` | `10000` |
//! | `SKUFILL_ALLOC_MAX_ATTEMPTS` | `5` |
//! | `SKUFILL_ALLOC_INITIAL_DELAY_MS` | `5` |
//! | `SKUFILL_ALLOC_MAX_DELAY_MS` | `200` |
//! | `RUST_LOG` | `info` |
//! | `SKUFILL_METRICS_ADDR` | unset (no exporter) |
//!
//! # Example
//!
//! ```no_run
//! use skufill_runtime::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! println!("Pool size: {}", config.database.max_connections);
//! # Ok(())
//! # }
//! ```

use skufill_core::RetryPolicy;
use skufill_postgres::PoolConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),
    /// Variable set to something that does not parse
    #[error("Invalid value for {key}: {value}")]
    Invalid {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },
    /// Values parse but do not make sense together
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Database pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection string
    pub url: String,
    /// Maximum pool size
    pub max_connections: u32,
    /// Idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Pool settings for the Postgres store.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.url.clone())
            .with_max_connections(self.max_connections)
            .with_min_connections(self.min_connections)
            .with_acquire_timeout(self.acquire_timeout)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Optimistic secret allocation retries
#[derive(Debug, Clone, Copy)]
pub struct AllocationConfig {
    /// Claims tried before giving up
    pub max_attempts: u32,
    /// Backoff before the second claim
    pub initial_delay: Duration,
    /// Backoff cap
    pub max_delay: Duration,
}

impl AllocationConfig {
    /// Retry policy handed to the secret pool and the orchestrator.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "allocation max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::ValidationError(
                "allocation initial_delay exceeds max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging and metrics
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// `tracing-subscriber` filter directive
    pub log_filter: String,
    /// Where to serve Prometheus metrics, if anywhere
    pub metrics_addr: Option<SocketAddr>,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database pool
    pub database: DatabaseConfig,
    /// Secret allocation retries
    pub allocation: AllocationConfig,
    /// Logging and metrics
    pub observability: ObservabilityConfig,
    /// Deadline applied to each engine operation
    pub operation_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if `DATABASE_URL` is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable.
    ///
    /// # Errors
    ///
    /// Returns error if `DATABASE_URL` is missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            url: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| ConfigError::EnvVarNotSet("DATABASE_URL".to_string()))?,
            max_connections: parse_or(&lookup, "SKUFILL_DB_MAX_CONNECTIONS", 10)?,
            min_connections: parse_or(&lookup, "SKUFILL_DB_MIN_CONNECTIONS", 0)?,
            acquire_timeout: millis_or(&lookup, "SKUFILL_DB_ACQUIRE_TIMEOUT_MS", 5_000)?,
        };
        let allocation = AllocationConfig {
            max_attempts: parse_or(&lookup, "SKUFILL_ALLOC_MAX_ATTEMPTS", 5)?,
            initial_delay: millis_or(&lookup, "SKUFILL_ALLOC_INITIAL_DELAY_MS", 5)?,
            max_delay: millis_or(&lookup, "SKUFILL_ALLOC_MAX_DELAY_MS", 200)?,
        };
        let observability = ObservabilityConfig {
            log_filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            metrics_addr: lookup("SKUFILL_METRICS_ADDR")
                .map(|raw| parse("SKUFILL_METRICS_ADDR", &raw))
                .transpose()?,
        };

        let config = Self {
            database,
            allocation,
            observability,
            operation_timeout: millis_or(&lookup, "SKUFILL_OPERATION_TIMEOUT_MS", 10_000)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate entire configuration
    ///
    /// # Errors
    ///
    /// Returns error if any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.allocation.validate()?;
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "operation_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    lookup(key).map_or(Ok(default), |raw| parse(key, &raw))
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_or(lookup, key, default).map(Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/shop")])).unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.allocation.max_attempts, 5);
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.observability.log_filter, "info");
        assert!(config.observability.metrics_addr.is_none());
    }

    #[test]
    fn overrides_parse() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("SKUFILL_DB_MAX_CONNECTIONS", "32"),
            ("SKUFILL_ALLOC_MAX_ATTEMPTS", "8"),
            ("SKUFILL_OPERATION_TIMEOUT_MS", "250"),
            ("SKUFILL_METRICS_ADDR", "0.0.0.0:9090"),
        ]))
        .unwrap();
        assert_eq!(config.database.max_connections, 32);
        assert_eq!(config.allocation.retry_policy().max_attempts(), 8);
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(
            config.observability.metrics_addr,
            Some("0.0.0.0:9090".parse().unwrap())
        );
    }

    #[test]
    fn missing_database_url_is_an_error() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::EnvVarNotSet(_))
        ));
    }

    #[test]
    fn garbage_values_are_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("SKUFILL_DB_MAX_CONNECTIONS", "lots"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key, .. }) if key == "SKUFILL_DB_MAX_CONNECTIONS"
        ));
    }

    #[test]
    fn inconsistent_values_fail_validation() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("SKUFILL_DB_MIN_CONNECTIONS", "20"),
        ]));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
