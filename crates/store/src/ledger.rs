use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, TransactionRowId};
use domain::payment::{
    LedgerError, NewTransaction, PaymentTransaction, TransactionLedger, TransactionStatus,
    TransactionType,
};
use domain::{CurrencyCode, Money};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{Result, StoreError, duplicate_or_backend};

const ENTITY: &str = "PaymentTransaction";

const COLUMNS: &str = "id, order_id, transaction_id, kind, status, amount, currency, provider, raw_response, reconcile, metadata, created_at, updated_at";

/// PostgreSQL-backed payment transaction ledger.
#[derive(Clone)]
pub struct PgTransactionLedger {
    pool: PgPool,
    default_currency: CurrencyCode,
}

impl PgTransactionLedger {
    pub fn new(pool: PgPool, default_currency: CurrencyCode) -> Self {
        Self {
            pool,
            default_currency,
        }
    }

    fn invalid(column: &'static str, value: impl Into<String>) -> StoreError {
        StoreError::InvalidColumn {
            column,
            value: value.into(),
        }
    }

    fn row_to_transaction(row: PgRow) -> Result<PaymentTransaction> {
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency")?;
        let metadata: Value = row.try_get("metadata")?;

        Ok(PaymentTransaction {
            id: Some(TransactionRowId::new(row.try_get("id")?)),
            order_id: OrderId::new(row.try_get("order_id")?),
            transaction_id: row.try_get("transaction_id")?,
            kind: kind
                .parse()
                .map_err(|_| Self::invalid("payment_transactions.kind", kind.clone()))?,
            status: status
                .parse()
                .map_err(|_| Self::invalid("payment_transactions.status", status.clone()))?,
            amount: Money::from_minor(row.try_get("amount")?),
            currency: CurrencyCode::new(&currency)
                .map_err(|_| Self::invalid("payment_transactions.currency", currency.clone()))?,
            provider: row.try_get("provider")?,
            raw_response: row.try_get("raw_response")?,
            reconcile: row.try_get("reconcile")?,
            metadata: serde_json::from_value(metadata)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn insert_row(&self, tx: &PaymentTransaction) -> Result<PaymentTransaction> {
        let metadata = serde_json::to_value(&tx.metadata)?;
        let sql = format!(
            r#"
            INSERT INTO payment_transactions
                (order_id, transaction_id, kind, status, amount, currency, provider, raw_response, reconcile, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(tx.order_id.as_i64())
            .bind(&tx.transaction_id)
            .bind(tx.kind.as_str())
            .bind(tx.status.as_str())
            .bind(tx.amount.minor())
            .bind(tx.currency.as_str())
            .bind(&tx.provider)
            .bind(&tx.raw_response)
            .bind(tx.reconcile)
            .bind(metadata)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_transaction(row)
    }

    async fn fetch_many(&self, sql: &str, order_id: OrderId, kind: Option<TransactionType>) -> Result<Vec<PaymentTransaction>> {
        let mut query = sqlx::query(sql).bind(order_id.as_i64());
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_transaction).collect()
    }
}

fn to_ledger(err: StoreError) -> LedgerError {
    LedgerError::Repository(err.into())
}

#[async_trait]
impl TransactionLedger for PgTransactionLedger {
    async fn record(&self, tx: NewTransaction) -> std::result::Result<PaymentTransaction, LedgerError> {
        let tx = tx.prepare(&self.default_currency, Utc::now())?;
        let key = format!("{}/{}", tx.provider, tx.transaction_id);
        self.insert_row(&tx)
            .await
            .map_err(|e| LedgerError::Repository(duplicate_or_backend(e, ENTITY, key)))
    }

    async fn latest_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> std::result::Result<Option<PaymentTransaction>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE order_id = $1 AND kind = $2 ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let rows = self
            .fetch_many(&sql, order_id, Some(kind))
            .await
            .map_err(to_ledger)?;
        Ok(rows.into_iter().next())
    }

    async fn count_successful_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> std::result::Result<u64, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payment_transactions WHERE order_id = $1 AND kind = $2 AND status = $3",
        )
        .bind(order_id.as_i64())
        .bind(kind.as_str())
        .bind(TransactionStatus::Successful.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| to_ledger(e.into()))?;

        Ok(count.max(0) as u64)
    }

    async fn sum_successful_amount_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> std::result::Result<Money, LedgerError> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_transactions
            WHERE order_id = $1 AND kind = $2 AND status = $3
            "#,
        )
        .bind(order_id.as_i64())
        .bind(kind.as_str())
        .bind(TransactionStatus::Successful.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| to_ledger(e.into()))?;

        Ok(Money::from_minor(sum))
    }

    async fn find_by_transaction_id(
        &self,
        provider: &str,
        transaction_id: &str,
    ) -> std::result::Result<Option<PaymentTransaction>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE provider = $1 AND transaction_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(provider)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_ledger(e.into()))?;

        row.map(Self::row_to_transaction)
            .transpose()
            .map_err(to_ledger)
    }

    async fn list_by_order(&self, order_id: OrderId) -> std::result::Result<Vec<PaymentTransaction>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE order_id = $1 ORDER BY created_at ASC, id ASC"
        );
        self.fetch_many(&sql, order_id, None)
            .await
            .map_err(to_ledger)
    }

    async fn update_status(
        &self,
        provider: &str,
        transaction_id: &str,
        status: TransactionStatus,
        raw_response: Option<Value>,
    ) -> std::result::Result<PaymentTransaction, LedgerError> {
        let sql = format!(
            r#"
            UPDATE payment_transactions
            SET status = $1,
                raw_response = COALESCE($2, raw_response),
                reconcile = CASE WHEN $1 = 'pending' THEN reconcile ELSE FALSE END,
                updated_at = $3
            WHERE provider = $4 AND transaction_id = $5
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(raw_response)
            .bind(Utc::now())
            .bind(provider)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| to_ledger(e.into()))?;

        match row {
            Some(row) => Self::row_to_transaction(row).map_err(to_ledger),
            None => Err(LedgerError::TransactionNotFound {
                provider: provider.to_string(),
                transaction_id: transaction_id.to_string(),
            }),
        }
    }

    async fn pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> std::result::Result<Vec<PaymentTransaction>, LedgerError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE status = $1 AND created_at < $2 ORDER BY created_at ASC, id ASC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(TransactionStatus::Pending.as_str())
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| to_ledger(e.into()))?;

        rows.into_iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()
            .map_err(to_ledger)
    }
}
