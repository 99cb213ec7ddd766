use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CheckoutId, Version};
use domain::checkout::{Checkout, CheckoutRepository, Owner};
use domain::{Aggregate, CheckoutStatus, RepositoryError, RepositoryResult};
use sqlx::{PgExecutor, PgPool, Row, postgres::PgRow};

use crate::error::{Result, StoreError, duplicate_or_backend};
use crate::{decode_document, encode_document};

const ENTITY: &str = "Checkout";

/// PostgreSQL-backed checkout repository.
///
/// The aggregate is stored as a JSONB document; `version` is checked and
/// bumped in the same `UPDATE` so concurrent saves of one checkout serialize.
#[derive(Clone)]
pub struct PgCheckoutRepository {
    pool: PgPool,
}

impl PgCheckoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn owner_columns(owner: &Owner) -> (&'static str, String) {
        match owner {
            Owner::Registered(user_id) => ("registered", user_id.to_string()),
            Owner::Guest(session) => ("guest", session.as_str().to_string()),
        }
    }

    fn row_to_checkout(row: PgRow) -> Result<Checkout> {
        let mut checkout: Checkout = decode_document(&row)?;
        checkout.set_version(Version::new(row.try_get("version")?));
        Ok(checkout)
    }

    async fn insert_row(&self, mut checkout: Checkout) -> Result<Checkout> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('checkouts', 'id'))")
            .fetch_one(&mut *tx)
            .await?;
        checkout.assign_id(CheckoutId::new(id));
        checkout.set_version(Version::first());

        let (owner_kind, owner_key) = Self::owner_columns(checkout.owner());
        sqlx::query(
            r#"
            INSERT INTO checkouts (id, version, owner_kind, owner_key, status, expires_at, created_at, updated_at, document)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(checkout.version().as_i64())
        .bind(owner_kind)
        .bind(owner_key)
        .bind(checkout.status().as_str())
        .bind(checkout.expires_at())
        .bind(checkout.created_at())
        .bind(checkout.updated_at())
        .bind(encode_document(&checkout)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(checkout)
    }

    /// Returns the stored version when the conditional update matched nothing.
    async fn stored_version(&self, id: CheckoutId) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM checkouts WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(Version::new))
    }

    async fn update_row<'e>(
        executor: impl PgExecutor<'e>,
        checkout: &Checkout,
        id: CheckoutId,
    ) -> Result<Option<Checkout>> {
        let mut updated = checkout.clone();
        updated.set_version(checkout.version().next());

        let (owner_kind, owner_key) = Self::owner_columns(updated.owner());
        let result = sqlx::query(
            r#"
            UPDATE checkouts
            SET version = $1, owner_kind = $2, owner_key = $3, status = $4,
                expires_at = $5, updated_at = $6, document = $7
            WHERE id = $8 AND version = $9
            "#,
        )
        .bind(updated.version().as_i64())
        .bind(owner_kind)
        .bind(owner_key)
        .bind(updated.status().as_str())
        .bind(updated.expires_at())
        .bind(updated.updated_at())
        .bind(encode_document(&updated)?)
        .bind(id.as_i64())
        .bind(checkout.version().as_i64())
        .execute(executor)
        .await?;

        Ok((result.rows_affected() == 1).then_some(updated))
    }

    /// Deletes `absorbed` and updates `target` in one transaction. Returns the
    /// id of the row whose version had moved when either statement matched
    /// nothing; the transaction is rolled back in that case.
    async fn write_merge(
        &self,
        target: &Checkout,
        target_id: CheckoutId,
        absorbed: &Checkout,
        absorbed_id: CheckoutId,
    ) -> Result<std::result::Result<Checkout, CheckoutId>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM checkouts WHERE id = $1 AND version = $2")
            .bind(absorbed_id.as_i64())
            .bind(absorbed.version().as_i64())
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() != 1 {
            return Ok(Err(absorbed_id));
        }

        let Some(updated) = Self::update_row(&mut *tx, target, target_id).await? else {
            return Ok(Err(target_id));
        };
        tx.commit().await?;
        Ok(Ok(updated))
    }

    async fn conflict(&self, id: CheckoutId, expected: Version) -> RepositoryError {
        match self.stored_version(id).await {
            Ok(Some(actual)) => RepositoryError::ConcurrencyConflict {
                entity: ENTITY,
                id: id.to_string(),
                expected,
                actual,
            },
            Ok(None) => RepositoryError::not_found(ENTITY, id),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl CheckoutRepository for PgCheckoutRepository {
    async fn insert(&self, checkout: Checkout) -> RepositoryResult<Checkout> {
        let owner = checkout.owner().to_string();
        self.insert_row(checkout)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, owner))
    }

    async fn get(&self, id: CheckoutId) -> RepositoryResult<Option<Checkout>> {
        let row = sqlx::query("SELECT version, document FROM checkouts WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_checkout).transpose()?)
    }

    async fn save(&self, checkout: &Checkout) -> RepositoryResult<Checkout> {
        let id = checkout
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;

        let updated = Self::update_row(&self.pool, checkout, id)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, checkout.owner().to_string()))?;
        match updated {
            Some(updated) => Ok(updated),
            None => Err(self.conflict(id, checkout.version()).await),
        }
    }

    async fn find_active_by_owner(&self, owner: &Owner) -> RepositoryResult<Option<Checkout>> {
        let (owner_kind, owner_key) = Self::owner_columns(owner);
        let row = sqlx::query(
            r#"
            SELECT version, document FROM checkouts
            WHERE owner_kind = $1 AND owner_key = $2 AND status = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_kind)
        .bind(owner_key)
        .bind(CheckoutStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_checkout).transpose()?)
    }

    async fn find_expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> RepositoryResult<Vec<Checkout>> {
        let rows = sqlx::query(
            r#"
            SELECT version, document FROM checkouts
            WHERE status = $1 AND expires_at < $2
            ORDER BY expires_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(CheckoutStatus::Active.as_str())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .map(Self::row_to_checkout)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn delete(&self, id: CheckoutId) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM checkouts WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn save_merged(&self, target: &Checkout, absorbed: &Checkout) -> RepositoryResult<Checkout> {
        let target_id = target
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;
        let absorbed_id = absorbed
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;

        let written = self
            .write_merge(target, target_id, absorbed, absorbed_id)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, target.owner().to_string()))?;
        match written {
            Ok(saved) => Ok(saved),
            Err(stale) if stale == absorbed_id => Err(self.conflict(stale, absorbed.version()).await),
            Err(stale) => Err(self.conflict(stale, target.version()).await),
        }
    }
}
