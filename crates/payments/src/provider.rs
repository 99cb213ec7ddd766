//! The capability set every payment provider implements.

use async_trait::async_trait;
use common::OrderId;
use domain::{CurrencyCode, Money};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// What the gateway asks a provider to charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub order_number: String,
    pub amount: Money,
    pub currency: CurrencyCode,
    /// Where the shopper comes back to after a redirect step.
    pub return_url: Option<String>,
}

/// State of a payment as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Funds are confirmed.
    Approved,
    /// The shopper must complete a step (3-D Secure, bank redirect) at `action_url`.
    ActionRequired { action_url: String },
    /// The provider will confirm later.
    Pending,
}

/// A provider's answer to a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The provider's identifier for this interaction.
    pub transaction_id: String,
    pub outcome: PaymentOutcome,
    pub amount: Money,
    /// Key of the provider that handled the call. Filled in by the gateway.
    #[serde(default)]
    pub provider: String,
    pub raw: Value,
}

impl ProviderResponse {
    pub fn new(transaction_id: impl Into<String>, outcome: PaymentOutcome, amount: Money) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            outcome,
            amount,
            provider: String::new(),
            raw: Value::Null,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn is_approved(&self) -> bool {
        self.outcome == PaymentOutcome::Approved
    }
}

/// A payment provider integration.
///
/// Business refusals are reported as [`ProviderError::Rejected`] and
/// infrastructure failures as [`ProviderError::Unreachable`]; callers treat
/// the two very differently.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Starts a payment (authorization) for an order.
    async fn process_payment(&self, request: &PaymentRequest) -> Result<ProviderResponse, ProviderError>;

    /// Looks up the current state of an earlier payment.
    async fn verify_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError>;

    async fn capture_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, ProviderError>;

    async fn refund_payment(
        &self,
        transaction_id: &str,
        amount: Money,
    ) -> Result<ProviderResponse, ProviderError>;

    async fn cancel_payment(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError>;

    /// Marks a payment approved without the shopper. Sandbox and offline use only.
    async fn force_approve(&self, transaction_id: &str) -> Result<ProviderResponse, ProviderError>;
}
