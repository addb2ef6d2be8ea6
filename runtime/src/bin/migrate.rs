//! Apply the schema and migrate legacy single-SKU data, then exit.
//!
//! Run with: `DATABASE_URL=postgres://... skufill-migrate`

use anyhow::Context;
use skufill_runtime::{Config, Engine, MetricsServer, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.observability.log_filter)?;

    let mut metrics = config.observability.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start()?;
    }

    let engine = Engine::bootstrap(&config)
        .await
        .context("engine startup failed")?;

    let report = engine.migration();
    for product in &report.products {
        tracing::info!(
            product_id = %product.product_id,
            sku_id = %product.sku_id,
            order_items = product.reassigned.order_items,
            cart_items = product.reassigned.cart_items,
            secret_batches = product.reassigned.secret_batches,
            secrets = product.reassigned.secrets,
            "Migrated product"
        );
    }
    if report.is_noop() {
        tracing::info!("Nothing to migrate");
    }
    Ok(())
}
