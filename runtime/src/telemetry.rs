//! Logging and Prometheus metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use skufill_runtime::telemetry::{MetricsServer, init_tracing};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing("info,skufill_core=debug")?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors from telemetry setup.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Log filter directive does not parse
    #[error("Invalid log filter: {0}")]
    Filter(String),
    /// A global subscriber was already installed
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Install the global `tracing` subscriber.
///
/// # Errors
///
/// Returns error if `filter` is not a valid directive or a subscriber is already set.
pub fn init_tracing(filter: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(filter).map_err(|e| TelemetryError::Filter(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the recorder and serve `/metrics`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or bound.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), the call logs a
    /// warning and leaves [`Self::handle`] empty.
    pub fn start(&mut self) -> Result<(), TelemetryError> {
        skufill_core::metrics::describe_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| TelemetryError::Build(e.to_string()))?
            .build()
            .map_err(|e| TelemetryError::Build(e.to_string()))?;
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!(error = %e, "Metrics recorder already initialized, skipping");
            return Ok(());
        }

        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(%addr, error = ?e, "Metrics exporter stopped");
            }
        });
        tracing::info!(%addr, "Metrics available at http://{addr}/metrics");
        self.handle = Some(handle);
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use skufill_core::FulfillmentMode;
    use skufill_core::metrics::FulfillmentMetrics;
    use std::time::Duration;

    #[test]
    fn rejects_bad_filter() {
        assert!(matches!(
            init_tracing("skufill_core=loud"),
            Err(TelemetryError::Filter(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_fulfillment_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        FulfillmentMetrics::record_fulfillment(FulfillmentMode::Auto);
        FulfillmentMetrics::record_order_duration(Duration::from_millis(40));
        FulfillmentMetrics::record_reservation(false);

        // Another test may have installed the recorder first; metrics are still recorded.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("skufill_fulfillments_total"));
            assert!(rendered.contains("skufill_fulfillment_duration_seconds"));
            assert!(rendered.contains("skufill_stock_reservations_total"));
        }
    }
}
