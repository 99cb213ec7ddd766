//! Domain error types.

use thiserror::Error;

use crate::checkout::CheckoutError;
use crate::discount::DiscountError;
use crate::money::MoneyError;
use crate::order::OrderError;
use crate::payment::LedgerError;
use crate::repository::RepositoryError;
use crate::shipping::ShippingError;

/// Broad classes of failure callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, rejected before anything changed.
    Validation,
    /// The requested status change is not allowed from the current status.
    InvalidTransition,
    /// A referenced entity does not exist.
    NotFound,
    /// Lost an optimistic concurrency race or hit a unique key; re-fetch and retry.
    Conflict,
    /// A payment provider rejected the request or could not be reached.
    Provider,
    /// Stored data is in a state that needs repair.
    Inconsistency,
    /// Storage or other infrastructure failed.
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Provider => "provider",
            ErrorKind::Inconsistency => "inconsistency",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Discount error: {0}")]
    Discount(#[from] DiscountError),

    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Stored state contradicts itself and was not repaired automatically.
    #[error("Inconsistent state: {0}")]
    Inconsistency(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Money(_) => ErrorKind::Validation,
            DomainError::Discount(e) => e.kind(),
            DomainError::Shipping(e) => e.kind(),
            DomainError::Checkout(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::Ledger(e) => e.kind(),
            DomainError::Repository(e) => e.kind(),
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Inconsistency(_) => ErrorKind::Inconsistency,
        }
    }
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::ConcurrencyConflict { .. } | RepositoryError::Duplicate { .. } => {
                ErrorKind::Conflict
            }
            RepositoryError::NotPersisted { .. } => ErrorKind::Validation,
            RepositoryError::Backend(_) => ErrorKind::Infrastructure,
        }
    }
}

impl DiscountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiscountError::UnknownCode { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }
}

impl ShippingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShippingError::RateNotFound(_) | ShippingError::MethodNotFound(_) => ErrorKind::NotFound,
            ShippingError::Repository(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::InvalidStateTransition { .. } | CheckoutError::Expired { .. } => {
                ErrorKind::InvalidTransition
            }
            CheckoutError::ItemNotFound { .. } => ErrorKind::NotFound,
            CheckoutError::Discount(e) => e.kind(),
            CheckoutError::Shipping(e) => e.kind(),
            CheckoutError::Order(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidStateTransition { .. } | OrderError::DiscountNotAllowed { .. } => {
                ErrorKind::InvalidTransition
            }
            OrderError::Discount(e) => e.kind(),
            _ => ErrorKind::Validation,
        }
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Repository(e) => e.kind(),
            LedgerError::TransactionNotFound { .. } => ErrorKind::NotFound,
            LedgerError::AlreadySucceeded { .. } | LedgerError::InFlight { .. } => {
                ErrorKind::Conflict
            }
            _ => ErrorKind::Validation,
        }
    }
}
