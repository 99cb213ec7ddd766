//! Append-only record of provider interactions per order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, TransactionRowId};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{LedgerError, NewTransaction, PaymentTransaction, TransactionStatus, TransactionType};
use crate::money::{CurrencyCode, Money};
use crate::repository::RepositoryError;

/// Persistence for payment transactions.
///
/// The aggregate queries are what callers consult before issuing a capture or
/// refund, so they must see every row committed before the caller's lock.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Appends a row. `(provider, transaction_id)` is unique.
    async fn record(&self, tx: NewTransaction) -> Result<PaymentTransaction, LedgerError>;

    /// Most recent row for the pair, by creation time.
    async fn latest_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn count_successful_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<u64, LedgerError>;

    async fn sum_successful_amount_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<Money, LedgerError>;

    async fn find_by_transaction_id(
        &self,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    /// Every row for the order, oldest first.
    async fn list_by_order(&self, order_id: OrderId) -> Result<Vec<PaymentTransaction>, LedgerError>;

    /// Settles a row in place once the provider reports the outcome.
    async fn update_status(
        &self,
        provider: &str,
        transaction_id: &str,
        status: TransactionStatus,
        raw_response: Option<Value>,
    ) -> Result<PaymentTransaction, LedgerError>;

    /// Pending rows created before `cutoff`, oldest first.
    async fn pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PaymentTransaction>, LedgerError>;
}

/// Refuses a second successful transaction of a kind that may only happen once
/// per order (capture, cancel).
pub async fn ensure_not_succeeded(
    ledger: &dyn TransactionLedger,
    order_id: OrderId,
    kind: TransactionType,
) -> Result<(), LedgerError> {
    if ledger.count_successful_by_order_and_type(order_id, kind).await? > 0 {
        return Err(LedgerError::AlreadySucceeded { order_id, kind });
    }
    Ok(())
}

/// Refuses a new provider call while an earlier one of the same kind is still
/// pending or waiting on reconciliation. Resolving that row (through a
/// confirmation or reconciliation) lifts the block.
pub async fn ensure_none_in_flight(
    ledger: &dyn TransactionLedger,
    order_id: OrderId,
    kind: TransactionType,
) -> Result<(), LedgerError> {
    let rows = ledger.list_by_order(order_id).await?;
    if let Some(open) = rows
        .into_iter()
        .find(|tx| tx.kind == kind && (tx.status == TransactionStatus::Pending || tx.reconcile))
    {
        return Err(LedgerError::InFlight {
            order_id,
            kind,
            transaction_id: open.transaction_id,
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
struct LedgerTable {
    rows: Vec<PaymentTransaction>,
    next_id: i64,
}

/// In-memory ledger for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionLedger {
    state: Arc<RwLock<LedgerTable>>,
    default_currency: CurrencyCode,
}

impl InMemoryTransactionLedger {
    pub fn new(default_currency: CurrencyCode) -> Self {
        Self {
            state: Arc::default(),
            default_currency,
        }
    }

    fn successful(
        rows: &[PaymentTransaction],
        order_id: OrderId,
        kind: TransactionType,
    ) -> impl Iterator<Item = &PaymentTransaction> {
        rows.iter()
            .filter(move |tx| tx.order_id == order_id && tx.kind == kind && tx.is_successful())
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn record(&self, tx: NewTransaction) -> Result<PaymentTransaction, LedgerError> {
        let mut tx = tx.prepare(&self.default_currency, Utc::now())?;
        let mut state = self.state.write().await;

        if state
            .rows
            .iter()
            .any(|row| row.provider == tx.provider && row.transaction_id == tx.transaction_id)
        {
            return Err(RepositoryError::Duplicate {
                entity: "PaymentTransaction",
                key: format!("{}/{}", tx.provider, tx.transaction_id),
            }
            .into());
        }

        state.next_id += 1;
        tx.id = Some(TransactionRowId::new(state.next_id));
        state.rows.push(tx.clone());
        Ok(tx)
    }

    async fn latest_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .filter(|tx| tx.order_id == order_id && tx.kind == kind)
            .max_by_key(|tx| (tx.created_at, tx.id))
            .cloned())
    }

    async fn count_successful_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        Ok(Self::successful(&state.rows, order_id, kind).count() as u64)
    }

    async fn sum_successful_amount_by_order_and_type(
        &self,
        order_id: OrderId,
        kind: TransactionType,
    ) -> Result<Money, LedgerError> {
        let state = self.state.read().await;
        Ok(Self::successful(&state.rows, order_id, kind)
            .map(|tx| tx.amount)
            .sum())
    }

    async fn find_by_transaction_id(
        &self,
        provider: &str,
        transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .find(|tx| tx.provider == provider && tx.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_by_order(&self, order_id: OrderId) -> Result<Vec<PaymentTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .filter(|tx| tx.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        provider: &str,
        transaction_id: &str,
        status: TransactionStatus,
        raw_response: Option<Value>,
    ) -> Result<PaymentTransaction, LedgerError> {
        let mut state = self.state.write().await;
        let row = state
            .rows
            .iter_mut()
            .find(|tx| tx.provider == provider && tx.transaction_id == transaction_id)
            .ok_or_else(|| LedgerError::TransactionNotFound {
                provider: provider.to_string(),
                transaction_id: transaction_id.to_string(),
            })?;

        row.status = status;
        if raw_response.is_some() {
            row.raw_response = raw_response;
        }
        if status.is_final() {
            row.reconcile = false;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PaymentTransaction>, LedgerError> {
        let state = self.state.read().await;
        let mut rows: Vec<PaymentTransaction> = state
            .rows
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|tx| (tx.created_at, tx.id));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ledger() -> InMemoryTransactionLedger {
        InMemoryTransactionLedger::new(CurrencyCode::default())
    }

    fn tx(order: i64, id: &str, kind: TransactionType, status: TransactionStatus, amount: i64) -> NewTransaction {
        NewTransaction::new(
            OrderId::new(order),
            id,
            kind,
            status,
            Money::from_minor(amount),
            "sandbox",
        )
    }

    #[tokio::test]
    async fn test_record_assigns_row_id_and_rejects_duplicates() {
        let ledger = ledger();
        let row = ledger
            .record(tx(1, "a", TransactionType::Authorize, TransactionStatus::Successful, 1000))
            .await
            .unwrap();
        assert_eq!(row.id, Some(TransactionRowId::new(1)));
        assert_eq!(row.currency.as_str(), "USD");

        let err = ledger
            .record(tx(1, "a", TransactionType::Capture, TransactionStatus::Successful, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Repository(RepositoryError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_latest_returns_none_when_absent() {
        let ledger = ledger();
        let latest = ledger
            .latest_by_order_and_type(OrderId::new(1), TransactionType::Refund)
            .await
            .unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn test_latest_is_most_recent() {
        let ledger = ledger();
        ledger
            .record(tx(1, "a", TransactionType::Authorize, TransactionStatus::Failed, 1000))
            .await
            .unwrap();
        ledger
            .record(tx(1, "b", TransactionType::Authorize, TransactionStatus::Successful, 1000))
            .await
            .unwrap();

        let latest = ledger
            .latest_by_order_and_type(OrderId::new(1), TransactionType::Authorize)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.transaction_id, "b");
    }

    #[tokio::test]
    async fn test_aggregates_count_only_successful_rows() {
        let ledger = ledger();
        let order = OrderId::new(7);
        ledger
            .record(tx(7, "r1", TransactionType::Refund, TransactionStatus::Successful, 300))
            .await
            .unwrap();
        ledger
            .record(tx(7, "r2", TransactionType::Refund, TransactionStatus::Failed, 500))
            .await
            .unwrap();
        ledger
            .record(tx(7, "r3", TransactionType::Refund, TransactionStatus::Successful, 200))
            .await
            .unwrap();
        ledger
            .record(tx(8, "r4", TransactionType::Refund, TransactionStatus::Successful, 999))
            .await
            .unwrap();

        let count = ledger
            .count_successful_by_order_and_type(order, TransactionType::Refund)
            .await
            .unwrap();
        let sum = ledger
            .sum_successful_amount_by_order_and_type(order, TransactionType::Refund)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(sum, Money::from_minor(500));
    }

    #[tokio::test]
    async fn test_second_capture_is_refused_by_guard() {
        let ledger = ledger();
        let order = OrderId::new(3);
        ensure_not_succeeded(&ledger, order, TransactionType::Capture)
            .await
            .unwrap();

        ledger
            .record(tx(3, "cap-1", TransactionType::Capture, TransactionStatus::Successful, 1600))
            .await
            .unwrap();

        let err = ensure_not_succeeded(&ledger, order, TransactionType::Capture)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadySucceeded {
                order_id: order,
                kind: TransactionType::Capture,
            }
        );
    }

    #[tokio::test]
    async fn test_pending_capture_blocks_another_until_resolved() {
        let ledger = ledger();
        let order = OrderId::new(4);
        ledger
            .record(
                tx(4, "local-1", TransactionType::Capture, TransactionStatus::Pending, 1600)
                    .needing_reconciliation(),
            )
            .await
            .unwrap();

        let err = ensure_none_in_flight(&ledger, order, TransactionType::Capture)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InFlight { ref transaction_id, .. } if transaction_id == "local-1"
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);

        // Other kinds are unaffected.
        ensure_none_in_flight(&ledger, order, TransactionType::Refund)
            .await
            .unwrap();

        ledger
            .update_status("sandbox", "local-1", TransactionStatus::Failed, None)
            .await
            .unwrap();
        ensure_none_in_flight(&ledger, order, TransactionType::Capture)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_status_settles_pending_row() {
        let ledger = ledger();
        ledger
            .record(
                tx(2, "p1", TransactionType::Authorize, TransactionStatus::Pending, 1000)
                    .needing_reconciliation(),
            )
            .await
            .unwrap();

        let settled = ledger
            .update_status(
                "sandbox",
                "p1",
                TransactionStatus::Successful,
                Some(serde_json::json!({"state": "approved"})),
            )
            .await
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Successful);
        assert!(!settled.reconcile);
        assert_eq!(settled.raw_response.unwrap()["state"], "approved");

        let err = ledger
            .update_status("sandbox", "missing", TransactionStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransactionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_older_than() {
        let ledger = ledger();
        ledger
            .record(tx(1, "p1", TransactionType::Authorize, TransactionStatus::Pending, 100))
            .await
            .unwrap();
        ledger
            .record(tx(1, "s1", TransactionType::Capture, TransactionStatus::Successful, 100))
            .await
            .unwrap();

        let future = Utc::now() + Duration::minutes(1);
        let pending = ledger.pending_older_than(future, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_id, "p1");

        let past = Utc::now() - Duration::minutes(1);
        assert!(ledger.pending_older_than(past, 10).await.unwrap().is_empty());
    }
}
