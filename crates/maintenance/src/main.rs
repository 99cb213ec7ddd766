//! Maintenance process entry point.

use std::sync::Arc;

use domain::checkout::CheckoutSweeper;
use domain::notification::NoopNotifier;
use domain::order::OrderService;
use maintenance::{MaintenanceConfig, MaintenanceError, MaintenanceJobs};
use store::{PgCatalog, PgCheckoutRepository, PgDiscountRepository, PgOrderRepository};

#[tokio::main]
async fn main() -> Result<(), MaintenanceError> {
    // 1. Configuration and tracing
    let config = MaintenanceConfig::from_env()?;
    maintenance::init_tracing(&config);

    // 2. Prometheus recorder
    maintenance::install_metrics(config.metrics_port)?;
    tracing::info!(port = config.metrics_port, "Metrics endpoint listening");

    // 3. Database
    let pool = store::connect(&config.database_url, config.max_connections).await?;
    store::run_migrations(&pool).await?;

    // 4. Jobs
    let sweeper = CheckoutSweeper::new(Arc::new(PgCheckoutRepository::new(pool.clone())))
        .with_batch_size(config.batch_size);
    let orders = OrderService::new(
        Arc::new(PgOrderRepository::new(pool.clone())),
        Arc::new(PgDiscountRepository::new(pool.clone())),
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(NoopNotifier),
    );
    let jobs = MaintenanceJobs::new(sweeper, orders, config.batch_size);

    tracing::info!(
        interval_secs = config.sweep_interval.as_secs(),
        "Starting maintenance loop"
    );
    jobs.run_until(config.sweep_interval, maintenance::shutdown_signal())
        .await;

    pool.close().await;
    tracing::info!("Maintenance shut down gracefully");
    Ok(())
}
