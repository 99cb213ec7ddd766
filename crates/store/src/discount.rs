use std::collections::BTreeSet;

use async_trait::async_trait;
use common::{CategoryId, DiscountId, ProductId};
use domain::discount::{CategoryResolver, DiscountRepository, normalize_code};
use domain::{Discount, RepositoryError, RepositoryResult};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{Result, StoreError, duplicate_or_backend};
use crate::{decode_document, encode_document};

const ENTITY: &str = "Discount";

/// PostgreSQL-backed discount repository.
///
/// The usage counter lives in its own column and is only ever changed by a
/// single conditional `UPDATE`, never read and written back.
#[derive(Clone)]
pub struct PgDiscountRepository {
    pool: PgPool,
}

impl PgDiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_discount(row: PgRow) -> Result<Discount> {
        let mut discount: Discount = decode_document(&row)?;
        let usage: i64 = row.try_get("current_usage")?;
        let usage = u32::try_from(usage).map_err(|_| StoreError::InvalidColumn {
            column: "discounts.current_usage",
            value: usage.to_string(),
        })?;
        discount.restore_usage(usage);
        Ok(discount)
    }

    async fn insert_row(&self, mut discount: Discount) -> Result<Discount> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('discounts', 'id'))")
            .fetch_one(&mut *tx)
            .await?;
        discount.assign_id(DiscountId::new(id));

        sqlx::query(
            r#"
            INSERT INTO discounts (id, code, active, usage_limit, current_usage, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(discount.code())
        .bind(discount.is_active())
        .bind(discount.usage_limit().map(i64::from))
        .bind(i64::from(discount.current_usage()))
        .bind(encode_document(&discount)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(discount)
    }

    async fn update_row(&self, discount: &Discount, id: DiscountId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE discounts SET code = $1, active = $2, usage_limit = $3, document = $4 WHERE id = $5",
        )
        .bind(discount.code())
        .bind(discount.is_active())
        .bind(discount.usage_limit().map(i64::from))
        .bind(encode_document(discount)?)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn exists(&self, id: DiscountId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM discounts WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl DiscountRepository for PgDiscountRepository {
    async fn insert(&self, discount: Discount) -> RepositoryResult<Discount> {
        let code = discount.code().to_string();
        self.insert_row(discount)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, code))
    }

    async fn get(&self, id: DiscountId) -> RepositoryResult<Option<Discount>> {
        let row = sqlx::query("SELECT current_usage, document FROM discounts WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_discount).transpose()?)
    }

    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<Discount>> {
        let row = sqlx::query("SELECT current_usage, document FROM discounts WHERE code = $1")
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(row.map(Self::row_to_discount).transpose()?)
    }

    async fn update(&self, discount: &Discount) -> RepositoryResult<()> {
        let id = discount
            .id()
            .ok_or(RepositoryError::NotPersisted { entity: ENTITY })?;

        let updated = self
            .update_row(discount, id)
            .await
            .map_err(|e| duplicate_or_backend(e, ENTITY, discount.code().to_string()))?;
        if updated == 0 {
            return Err(RepositoryError::not_found(ENTITY, id));
        }
        Ok(())
    }

    async fn try_increment_usage(&self, id: DiscountId) -> RepositoryResult<bool> {
        let incremented: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE discounts
            SET current_usage = current_usage + 1
            WHERE id = $1
              AND active
              AND (usage_limit IS NULL OR current_usage < usage_limit)
            RETURNING current_usage
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if incremented.is_some() {
            return Ok(true);
        }
        if !self.exists(id).await? {
            return Err(RepositoryError::not_found(ENTITY, id));
        }
        Ok(false)
    }

    async fn release_usage(&self, id: DiscountId) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE discounts SET current_usage = GREATEST(current_usage - 1, 0) WHERE id = $1",
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(ENTITY, id));
        }
        Ok(())
    }
}

/// Product/category membership read from `product_categories`.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records that a product belongs to a category.
    pub async fn assign(&self, product_id: ProductId, category_id: CategoryId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_categories (product_id, category_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(product_id.as_i64())
        .bind(category_id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CategoryResolver for PgCatalog {
    async fn products_in_categories(
        &self,
        categories: &BTreeSet<CategoryId>,
    ) -> RepositoryResult<BTreeSet<ProductId>> {
        if categories.is_empty() {
            return Ok(BTreeSet::new());
        }
        let category_ids: Vec<i64> = categories.iter().map(CategoryId::as_i64).collect();

        let product_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT product_id FROM product_categories WHERE category_id = ANY($1)",
        )
        .bind(category_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(product_ids.into_iter().map(ProductId::new).collect())
    }
}
