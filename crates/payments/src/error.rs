//! Payment error types.

use common::OrderId;
use domain::{DomainError, ErrorKind, LedgerError, Money, OrderStatus};
use thiserror::Error;

/// Failure reported by a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider refused the request (declined card, insufficient funds).
    #[error("Rejected by provider: {reason}")]
    Rejected { reason: String },

    /// The provider could not be reached or did not answer in time. The
    /// request may or may not have taken effect.
    #[error("Provider unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("Operation not supported by provider: {operation}")]
    Unsupported { operation: &'static str },
}

impl ProviderError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ProviderError::Rejected {
            reason: reason.into(),
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        ProviderError::Unreachable {
            reason: reason.into(),
        }
    }

    /// Label used on metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::Unreachable { .. } => "unreachable",
            ProviderError::Unsupported { .. } => "unsupported",
        }
    }
}

/// Errors returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No enabled provider is registered under the key.
    #[error("Payment provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("Provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

impl GatewayError {
    /// The provider failure, if the call reached a provider at all.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            GatewayError::Provider { source, .. } => Some(source),
            GatewayError::ProviderUnavailable { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.provider_error(), Some(ProviderError::Rejected { .. }))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self.provider_error(), Some(ProviderError::Unreachable { .. }))
    }
}

/// Errors that can occur while coordinating a payment.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The order's status does not allow the requested payment operation.
    #[error("Order {order_id} is {status}, cannot {operation}")]
    InvalidOrderStatus {
        order_id: OrderId,
        status: OrderStatus,
        operation: &'static str,
    },

    /// The order has no provider payment to act on.
    #[error("Order {order_id} has no recorded payment")]
    NoPayment { order_id: OrderId },

    #[error("Refund of {requested} exceeds refundable amount {refundable}")]
    RefundExceedsCaptured { requested: Money, refundable: Money },

    #[error("Refund amount must be positive: {amount}")]
    InvalidRefundAmount { amount: Money },
}

impl PaymentError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Gateway(GatewayError::ProviderUnavailable { .. }) => ErrorKind::Validation,
            PaymentError::Gateway(GatewayError::Provider { .. }) => ErrorKind::Provider,
            PaymentError::Domain(e) => e.kind(),
            PaymentError::Ledger(e) => e.kind(),
            PaymentError::InvalidOrderStatus { .. } | PaymentError::NoPayment { .. } => {
                ErrorKind::InvalidTransition
            }
            PaymentError::RefundExceedsCaptured { .. } | PaymentError::InvalidRefundAmount { .. } => {
                ErrorKind::Validation
            }
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_classification() {
        let rejected = GatewayError::Provider {
            provider: "sandbox".to_string(),
            source: ProviderError::rejected("card declined"),
        };
        assert!(rejected.is_rejected());
        assert!(!rejected.is_unreachable());
        assert_eq!(PaymentError::from(rejected).kind(), ErrorKind::Provider);

        let missing = GatewayError::ProviderUnavailable {
            provider: "acme".to_string(),
        };
        assert!(missing.provider_error().is_none());
        assert_eq!(PaymentError::from(missing).kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_ledger_guard_is_conflict() {
        let err = PaymentError::from(LedgerError::AlreadySucceeded {
            order_id: OrderId::new(1),
            kind: domain::payment::TransactionType::Capture,
        });
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
