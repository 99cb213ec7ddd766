use async_trait::async_trait;
use common::{ShippingMethodId, ShippingRateId, ShippingZoneId};
use domain::shipping::{ShippingMethod, ShippingRate, ShippingRepository, ShippingZone};
use domain::{RepositoryError, RepositoryResult};
use sqlx::PgPool;

use crate::error::{Result, StoreError};
use crate::{decode_document, encode_document};

/// PostgreSQL-backed shipping configuration.
#[derive(Clone)]
pub struct PgShippingRepository {
    pool: PgPool,
}

impl PgShippingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserves an id from the table's sequence.
    async fn next_id(&self, table: &'static str) -> Result<i64> {
        let id = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence($1, 'id'))")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn insert_document(&self, table: &'static str, id: i64, document: serde_json::Value) -> Result<()> {
        let sql = format!("INSERT INTO {table} (id, document) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(id)
            .bind(document)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn row_exists(&self, table: &'static str, id: i64) -> Result<bool> {
        let sql = format!("SELECT id FROM {table} WHERE id = $1");
        let found: Option<i64> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn insert_rate_row(&self, rate: &mut ShippingRate) -> Result<()> {
        let id = self.next_id("shipping_rates").await?;
        rate.assign_id(ShippingRateId::new(id));

        sqlx::query(
            "INSERT INTO shipping_rates (id, zone_id, method_id, document) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(rate.zone_id().as_i64())
        .bind(rate.method_id().as_i64())
        .bind(encode_document(rate)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ShippingRepository for PgShippingRepository {
    async fn insert_zone(&self, mut zone: ShippingZone) -> RepositoryResult<ShippingZone> {
        let id = self.next_id("shipping_zones").await?;
        zone.id = Some(ShippingZoneId::new(id));
        self.insert_document("shipping_zones", id, encode_document(&zone)?)
            .await?;
        Ok(zone)
    }

    async fn insert_method(&self, mut method: ShippingMethod) -> RepositoryResult<ShippingMethod> {
        let id = self.next_id("shipping_methods").await?;
        method.id = Some(ShippingMethodId::new(id));
        self.insert_document("shipping_methods", id, encode_document(&method)?)
            .await?;
        Ok(method)
    }

    async fn insert_rate(&self, mut rate: ShippingRate) -> RepositoryResult<ShippingRate> {
        if !self.row_exists("shipping_zones", rate.zone_id().as_i64()).await? {
            return Err(RepositoryError::not_found("ShippingZone", rate.zone_id()));
        }
        if !self
            .row_exists("shipping_methods", rate.method_id().as_i64())
            .await?
        {
            return Err(RepositoryError::not_found("ShippingMethod", rate.method_id()));
        }
        self.insert_rate_row(&mut rate).await?;
        Ok(rate)
    }

    async fn zones(&self) -> RepositoryResult<Vec<ShippingZone>> {
        let rows = sqlx::query("SELECT document FROM shipping_zones ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(rows
            .iter()
            .map(decode_document)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn get_method(&self, id: ShippingMethodId) -> RepositoryResult<Option<ShippingMethod>> {
        let row = sqlx::query("SELECT document FROM shipping_methods WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.as_ref().map(decode_document).transpose()?)
    }

    async fn get_rate(&self, id: ShippingRateId) -> RepositoryResult<Option<ShippingRate>> {
        let row = sqlx::query("SELECT document FROM shipping_rates WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.as_ref().map(decode_document).transpose()?)
    }

    async fn rates_for_zones(
        &self,
        zone_ids: &[ShippingZoneId],
    ) -> RepositoryResult<Vec<ShippingRate>> {
        let zone_ids: Vec<i64> = zone_ids.iter().map(ShippingZoneId::as_i64).collect();
        let rows = sqlx::query(
            "SELECT document FROM shipping_rates WHERE zone_id = ANY($1) ORDER BY id ASC",
        )
        .bind(zone_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows
            .iter()
            .map(decode_document)
            .collect::<Result<Vec<_>>>()?)
    }
}
