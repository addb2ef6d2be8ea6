//! Metric names and recorders for the fulfillment engine.
//!
//! Recording goes through the `metrics` facade; nothing is exported unless the runtime
//! installs a recorder (see `skufill_runtime::telemetry::MetricsServer`).

use crate::types::FulfillmentMode;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Register descriptions for every metric the engine records.
pub fn describe_metrics() {
    // Stock ledger
    describe_counter!(
        "skufill_stock_reservations_total",
        "Stock reservations attempted, labelled by outcome"
    );

    // Secret pool
    describe_counter!(
        "skufill_secrets_ingested_total",
        "Card secrets inserted into the pool"
    );
    describe_counter!(
        "skufill_secrets_allocated_total",
        "Card secrets handed out to order items"
    );
    describe_counter!(
        "skufill_allocation_conflicts_total",
        "Secret claims lost to a concurrent allocator"
    );
    describe_counter!(
        "skufill_pool_exhausted_total",
        "Allocations that found no available secret"
    );

    // Orchestrator
    describe_counter!(
        "skufill_fulfillments_total",
        "Order items fulfilled, labelled by mode"
    );
    describe_counter!(
        "skufill_fulfillments_reused_total",
        "Order items whose existing fulfillment was returned"
    );
    describe_histogram!(
        "skufill_fulfillment_duration_seconds",
        "Time taken to fulfill an order"
    );
    describe_counter!(
        "skufill_timeouts_total",
        "Operations aborted by their deadline"
    );

    // Migration and cart
    describe_counter!(
        "skufill_migrated_products_total",
        "Legacy products that received a default SKU"
    );
    describe_counter!(
        "skufill_cart_lines_pruned_total",
        "Stale cart lines removed while listing a cart"
    );
}

/// Fulfillment metrics recorder.
pub struct FulfillmentMetrics;

impl FulfillmentMetrics {
    /// Record a reservation attempt.
    pub fn record_reservation(succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "rejected" };
        counter!("skufill_stock_reservations_total", "outcome" => outcome).increment(1);
    }

    /// Record secrets inserted by an ingest.
    pub fn record_ingest(count: u64) {
        counter!("skufill_secrets_ingested_total").increment(count);
    }

    /// Record one allocated secret.
    pub fn record_allocation() {
        counter!("skufill_secrets_allocated_total").increment(1);
    }

    /// Record a lost claim race.
    pub fn record_conflict() {
        counter!("skufill_allocation_conflicts_total").increment(1);
    }

    /// Record an empty pool.
    pub fn record_exhausted() {
        counter!("skufill_pool_exhausted_total").increment(1);
    }

    /// Record a newly fulfilled order item.
    pub fn record_fulfillment(mode: FulfillmentMode) {
        counter!("skufill_fulfillments_total", "mode" => mode.as_str()).increment(1);
    }

    /// Record an order item that was already fulfilled.
    pub fn record_reuse() {
        counter!("skufill_fulfillments_reused_total").increment(1);
    }

    /// Record the duration of one `create_auto` call.
    pub fn record_order_duration(duration: Duration) {
        histogram!("skufill_fulfillment_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an expired deadline.
    pub fn record_timeout() {
        counter!("skufill_timeouts_total").increment(1);
    }

    /// Record a migrated legacy product.
    pub fn record_migrated_product() {
        counter!("skufill_migrated_products_total").increment(1);
    }

    /// Record a pruned cart line.
    pub fn record_pruned_cart_line() {
        counter!("skufill_cart_lines_pruned_total").increment(1);
    }
}
