//! Offline payments (bank transfer, cash on delivery).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::Money;
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::ProviderError;
use crate::provider::{PaymentOutcome, PaymentProvider, PaymentRequest, ProviderResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    AwaitingFunds,
    Received,
    Cancelled,
}

#[derive(Debug, Default)]
struct ManualState {
    transfers: HashMap<String, (TransferState, Money)>,
    next_id: u32,
}

/// Provider for payments settled outside any gateway.
///
/// A payment stays pending until staff confirm the funds with
/// [`force_approve`](PaymentProvider::force_approve). Refunds are handled
/// offline and are not supported here.
#[derive(Debug, Clone, Default)]
pub struct ManualProvider {
    state: Arc<RwLock<ManualState>>,
}

impl ManualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transfer(&self, transaction_id: &str) -> Result<(TransferState, Money), ProviderError> {
        self.state
            .read()
            .await
            .transfers
            .get(transaction_id)
            .copied()
            .ok_or_else(|| ProviderError::rejected(format!("unknown reference {transaction_id}")))
    }
}

#[async_trait]
impl PaymentProvider for ManualProvider {
    async fn process_payment(&self, request: &PaymentRequest) -> Result<ProviderResponse, ProviderError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let reference = format!("man_{:06}", state.next_id);
        state
            .transfers
            .insert(reference.clone(), (TransferState::AwaitingFunds, request.amount));

        Ok(
            ProviderResponse::new(&reference, PaymentOutcome::Pending, request.amount).with_raw(json!({
                "reference": reference,
                "instructions": format!("Transfer {} {} quoting {}", request.amount, request.currency, request.order_number),
            })),
        )
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        let (state, amount) = self.transfer(transaction_id).await?;
        let outcome = match state {
            TransferState::AwaitingFunds => PaymentOutcome::Pending,
            TransferState::Received => PaymentOutcome::Approved,
            TransferState::Cancelled => return Err(ProviderError::rejected("transfer cancelled")),
        };
        Ok(ProviderResponse::new(transaction_id, outcome, amount))
    }

    /// Funds already arrived; capturing only acknowledges them.
    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, ProviderError> {
        let (state, _) = self.transfer(transaction_id).await?;
        if state != TransferState::Received {
            return Err(ProviderError::rejected("funds not received"));
        }
        Ok(ProviderResponse::new(
            format!("{transaction_id}-capture"),
            PaymentOutcome::Approved,
            amount,
        ))
    }

    async fn refund_payment(
        &self,
        _transaction_id: &str,
        _amount: Money,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Unsupported {
            operation: "refund_payment",
        })
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        let mut state = self.state.write().await;
        let Some(transfer) = state.transfers.get_mut(transaction_id) else {
            return Err(ProviderError::rejected(format!("unknown reference {transaction_id}")));
        };
        if transfer.0 == TransferState::Received {
            return Err(ProviderError::rejected("funds already received"));
        }
        transfer.0 = TransferState::Cancelled;
        Ok(ProviderResponse::new(
            format!("{transaction_id}-cancel"),
            PaymentOutcome::Approved,
            transfer.1,
        ))
    }

    async fn force_approve(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        let mut state = self.state.write().await;
        let Some(transfer) = state.transfers.get_mut(transaction_id) else {
            return Err(ProviderError::rejected(format!("unknown reference {transaction_id}")));
        };
        if transfer.0 == TransferState::Cancelled {
            return Err(ProviderError::rejected("transfer cancelled"));
        }
        transfer.0 = TransferState::Received;
        Ok(ProviderResponse::new(transaction_id, PaymentOutcome::Approved, transfer.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::CurrencyCode;

    #[tokio::test]
    async fn test_pending_until_funds_confirmed() {
        let manual = ManualProvider::new();
        let request = PaymentRequest {
            order_id: OrderId::new(3),
            order_number: "GS-20250101-000003".to_string(),
            amount: Money::from_minor(4200),
            currency: CurrencyCode::default(),
            return_url: None,
        };

        let payment = manual.process_payment(&request).await.unwrap();
        assert_eq!(payment.outcome, PaymentOutcome::Pending);
        assert_eq!(
            manual.verify_payment(&payment.transaction_id).await.unwrap().outcome,
            PaymentOutcome::Pending
        );
        assert!(
            manual
                .capture_payment(&payment.transaction_id, request.amount)
                .await
                .is_err()
        );

        manual.force_approve(&payment.transaction_id).await.unwrap();
        assert!(
            manual
                .verify_payment(&payment.transaction_id)
                .await
                .unwrap()
                .is_approved()
        );
    }

    #[tokio::test]
    async fn test_refund_unsupported() {
        let manual = ManualProvider::new();
        let err = manual
            .refund_payment("man_000001", Money::from_minor(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderError::Unsupported {
                operation: "refund_payment"
            }
        );
    }
}
