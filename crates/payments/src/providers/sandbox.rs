//! Scriptable card-style provider for development and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use domain::Money;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::{PaymentOutcome, PaymentProvider, PaymentRequest, ProviderResponse};

/// How the sandbox answers its next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBehavior {
    Approve,
    /// Payment needs a shopper step before it is approved.
    RequireAction,
    Decline,
    Unreachable,
    /// Never answers.
    Stall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaymentState {
    Authorized,
    ActionRequired,
    Captured,
    Cancelled,
}

#[derive(Debug)]
struct SandboxPayment {
    state: PaymentState,
    amount: Money,
    captured: Money,
    refunded: Money,
}

#[derive(Debug, Default)]
struct SandboxState {
    payments: HashMap<String, SandboxPayment>,
    script: VecDeque<SandboxBehavior>,
    calls: Vec<&'static str>,
    next_id: u32,
}

impl SandboxState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:06}", self.next_id)
    }

    fn payment(&mut self, transaction_id: &str) -> Result<&mut SandboxPayment, ProviderError> {
        self.payments
            .get_mut(transaction_id)
            .ok_or_else(|| ProviderError::rejected(format!("unknown transaction {transaction_id}")))
    }
}

/// Sandbox payment provider.
///
/// Calls follow a script of [`SandboxBehavior`]s queued with
/// [`script`](Self::script); once the script runs out every call approves.
#[derive(Debug, Clone, Default)]
pub struct SandboxProvider {
    state: Arc<Mutex<SandboxState>>,
}

impl SandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues behaviors for the next calls, in order.
    pub async fn script(&self, behaviors: impl IntoIterator<Item = SandboxBehavior>) {
        self.state.lock().await.script.extend(behaviors);
    }

    /// Operations received so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    /// Records the call and pops the behavior it should follow.
    async fn begin(&self, operation: &'static str) -> Result<SandboxBehavior, ProviderError> {
        let behavior = {
            let mut state = self.state.lock().await;
            state.calls.push(operation);
            state.script.pop_front().unwrap_or(SandboxBehavior::Approve)
        };

        match behavior {
            SandboxBehavior::Approve | SandboxBehavior::RequireAction => Ok(behavior),
            SandboxBehavior::Decline => Err(ProviderError::rejected("card declined")),
            SandboxBehavior::Unreachable => Err(ProviderError::unreachable("connection reset")),
            SandboxBehavior::Stall => std::future::pending().await,
        }
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    async fn process_payment(&self, request: &PaymentRequest) -> Result<ProviderResponse, ProviderError> {
        let needs_action = self.begin("process_payment").await? == SandboxBehavior::RequireAction;
        let mut state = self.state.lock().await;

        let id = state.next_id("sbx_pay");
        let (payment_state, outcome) = if needs_action {
            (
                PaymentState::ActionRequired,
                PaymentOutcome::ActionRequired {
                    action_url: format!("https://sandbox.invalid/3ds/{id}"),
                },
            )
        } else {
            (PaymentState::Authorized, PaymentOutcome::Approved)
        };
        state.payments.insert(
            id.clone(),
            SandboxPayment {
                state: payment_state,
                amount: request.amount,
                captured: Money::zero(),
                refunded: Money::zero(),
            },
        );

        Ok(ProviderResponse::new(&id, outcome, request.amount).with_raw(json!({
            "id": id,
            "order": request.order_number,
            "amount": request.amount.minor(),
            "currency": request.currency.as_str(),
        })))
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        self.begin("verify_payment").await?;
        let mut state = self.state.lock().await;
        let payment = state.payment(transaction_id)?;

        let outcome = match payment.state {
            PaymentState::ActionRequired => PaymentOutcome::ActionRequired {
                action_url: format!("https://sandbox.invalid/3ds/{transaction_id}"),
            },
            PaymentState::Cancelled => {
                return Err(ProviderError::rejected("payment was cancelled"));
            }
            PaymentState::Authorized | PaymentState::Captured => PaymentOutcome::Approved,
        };
        Ok(ProviderResponse::new(transaction_id, outcome, payment.amount))
    }

    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, ProviderError> {
        self.begin("capture_payment").await?;
        let mut state = self.state.lock().await;
        let payment = state.payment(transaction_id)?;
        if payment.state != PaymentState::Authorized {
            return Err(ProviderError::rejected("payment is not authorized"));
        }
        if amount > payment.amount {
            return Err(ProviderError::rejected("capture exceeds authorized amount"));
        }
        payment.state = PaymentState::Captured;
        payment.captured = amount;

        let id = state.next_id("sbx_cap");
        Ok(ProviderResponse::new(&id, PaymentOutcome::Approved, amount)
            .with_raw(json!({ "id": id, "payment": transaction_id, "amount": amount.minor() })))
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, ProviderError> {
        self.begin("refund_payment").await?;
        let mut state = self.state.lock().await;
        let payment = state.payment(transaction_id)?;
        if payment.state != PaymentState::Captured {
            return Err(ProviderError::rejected("payment is not captured"));
        }
        if payment.refunded + amount > payment.captured {
            return Err(ProviderError::rejected("refund exceeds captured amount"));
        }
        payment.refunded += amount;

        let id = state.next_id("sbx_ref");
        Ok(ProviderResponse::new(&id, PaymentOutcome::Approved, amount)
            .with_raw(json!({ "id": id, "payment": transaction_id, "amount": amount.minor() })))
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        self.begin("cancel_payment").await?;
        let mut state = self.state.lock().await;
        let payment = state.payment(transaction_id)?;
        if payment.state == PaymentState::Captured {
            return Err(ProviderError::rejected("captured payments must be refunded"));
        }
        payment.state = PaymentState::Cancelled;
        let amount = payment.amount;

        let id = state.next_id("sbx_void");
        Ok(ProviderResponse::new(&id, PaymentOutcome::Approved, amount))
    }

    async fn force_approve(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError> {
        self.begin("force_approve").await?;
        let mut state = self.state.lock().await;
        let payment = state.payment(transaction_id)?;
        if payment.state == PaymentState::ActionRequired {
            payment.state = PaymentState::Authorized;
        }
        Ok(ProviderResponse::new(transaction_id, PaymentOutcome::Approved, payment.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::CurrencyCode;

    fn request(amount: i64) -> PaymentRequest {
        PaymentRequest {
            order_id: OrderId::new(7),
            order_number: "GS-20250101-000007".to_string(),
            amount: Money::from_minor(amount),
            currency: CurrencyCode::default(),
            return_url: None,
        }
    }

    #[tokio::test]
    async fn test_authorize_capture_refund() {
        let sandbox = SandboxProvider::new();
        let payment = sandbox.process_payment(&request(1000)).await.unwrap();
        assert!(payment.is_approved());

        let capture = sandbox
            .capture_payment(&payment.transaction_id, Money::from_minor(1000))
            .await
            .unwrap();
        assert_ne!(capture.transaction_id, payment.transaction_id);

        sandbox
            .refund_payment(&payment.transaction_id, Money::from_minor(600))
            .await
            .unwrap();
        let err = sandbox
            .refund_payment(&payment.transaction_id, Money::from_minor(600))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_action_required_until_forced() {
        let sandbox = SandboxProvider::new();
        sandbox.script([SandboxBehavior::RequireAction]).await;

        let payment = sandbox.process_payment(&request(1000)).await.unwrap();
        assert!(matches!(payment.outcome, PaymentOutcome::ActionRequired { .. }));

        let err = sandbox
            .capture_payment(&payment.transaction_id, Money::from_minor(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));

        sandbox.force_approve(&payment.transaction_id).await.unwrap();
        let verified = sandbox.verify_payment(&payment.transaction_id).await.unwrap();
        assert!(verified.is_approved());
    }

    #[tokio::test]
    async fn test_script_then_default_approve() {
        let sandbox = SandboxProvider::new();
        sandbox
            .script([SandboxBehavior::Decline, SandboxBehavior::Unreachable])
            .await;

        assert!(matches!(
            sandbox.process_payment(&request(100)).await,
            Err(ProviderError::Rejected { .. })
        ));
        assert!(matches!(
            sandbox.process_payment(&request(100)).await,
            Err(ProviderError::Unreachable { .. })
        ));
        assert!(sandbox.process_payment(&request(100)).await.is_ok());
        assert_eq!(sandbox.calls().await.len(), 3);
    }
}
