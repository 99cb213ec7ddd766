//! PostgreSQL persistence for the storefront engine.
//!
//! Every repository contract of the domain crate has an implementation here
//! backed by a shared [`PgPool`]. Schema changes live in the workspace
//! `migrations/` directory.

pub mod checkout;
pub mod discount;
pub mod error;
pub mod ledger;
pub mod order;
pub mod shipping;

pub use checkout::PgCheckoutRepository;
pub use discount::{PgCatalog, PgDiscountRepository};
pub use error::{Result, StoreError};
pub use ledger::PgTransactionLedger;
pub use order::PgOrderRepository;
pub use shipping::PgShippingRepository;

use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};

/// Connects a pool to the given database URL.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

pub(crate) fn encode_document<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn decode_document<T: DeserializeOwned>(row: &PgRow) -> Result<T> {
    let document: serde_json::Value = row.try_get("document")?;
    Ok(serde_json::from_value(document)?)
}
