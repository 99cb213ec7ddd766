use async_trait::async_trait;
use common::{OrderId, Version};
use domain::order::{Order, OrderRepository};
use domain::{Aggregate, RepositoryError, RepositoryResult};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{Result, StoreError, duplicate_or_backend};
use crate::{decode_document, encode_document};

const ENTITY: &str = "Order";

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let mut order: Order = decode_document(&row)?;
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    /// Inserts the row under its provisional number, then swaps in the final
    /// number derived from the new id before committing.
    async fn create_row(&self, mut order: Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        order.set_version(Version::first());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (version, number, provisional, status, checkout_id, created_at, updated_at, document)
            VALUES ($1, $2, TRUE, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(order.version().as_i64())
        .bind(order.number().as_str())
        .bind(order.status().as_str())
        .bind(order.checkout_id().map(|id| id.as_i64()))
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(encode_document(&order)?)
        .fetch_one(&mut *tx)
        .await?;

        order.assign_id(OrderId::new(id));

        sqlx::query("UPDATE orders SET number = $1, provisional = $2, document = $3 WHERE id = $4")
            .bind(order.number().as_str())
            .bind(order.number().is_provisional())
            .bind(encode_document(&order)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(order_id = id, number = %order.number(), "Order row created");
        Ok(order)
    }

    async fn update_row(&self, order: &Order, id: OrderId) -> Result<Option<Order>> {
        let mut updated = order.clone();
        updated.set_version(order.version().next());

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET version = $1, number = $2, provisional = $3, status = $4, updated_at = $5, document = $6
            WHERE id = $7 AND version = $8
            "#,
        )
        .bind(updated.version().as_i64())
        .bind(updated.number().as_str())
        .bind(updated.number().is_provisional())
        .bind(updated.status().as_str())
        .bind(updated.updated_at())
        .bind(encode_document(&updated)?)
        .bind(id.as_i64())
        .bind(order.version().as_i64())
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() == 1).then_some(updated))
    }

    async fn stored_version(&self, id: OrderId) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(Version::new))
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create(&self, order: Order) -> RepositoryResult<Order> {
        let number = order.number().to_string();
        self.create_row(order)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, number))
    }

    async fn get(&self, id: OrderId) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query("SELECT version, document FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_order).transpose()?)
    }

    async fn find_by_number(&self, number: &str) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query(
            "SELECT version, document FROM orders WHERE number = $1 ORDER BY id ASC LIMIT 1",
        )
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_order).transpose()?)
    }

    async fn save(&self, order: &Order) -> RepositoryResult<Order> {
        let id = order
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;

        let updated = self
            .update_row(order, id)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, order.number().to_string()))?;
        if let Some(updated) = updated {
            return Ok(updated);
        }

        match self.stored_version(id).await? {
            Some(actual) => Err(RepositoryError::ConcurrencyConflict {
                entity: ENTITY,
                id: id.to_string(),
                expected: order.version(),
                actual,
            }),
            None => Err(RepositoryError::not_found(ENTITY, id)),
        }
    }

    async fn find_provisional(&self, limit: usize) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT version, document FROM orders WHERE provisional ORDER BY id ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?)
    }
}
