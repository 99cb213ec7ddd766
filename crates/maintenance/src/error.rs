//! Errors that stop the maintenance process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
