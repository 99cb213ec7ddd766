//! Payment transaction ledger.

mod ledger;
mod transaction;

pub use ledger::{
    InMemoryTransactionLedger, TransactionLedger, ensure_none_in_flight, ensure_not_succeeded,
};
pub use transaction::{NewTransaction, PaymentTransaction, TransactionStatus, TransactionType};

use common::OrderId;
use thiserror::Error;

use crate::money::Money;
use crate::repository::RepositoryError;

/// Errors that can occur while recording or querying payment transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Payment transaction requires an order id")]
    MissingOrderId,

    #[error("Payment transaction requires a provider transaction id")]
    MissingTransactionId,

    #[error("Payment transaction requires a provider")]
    MissingProvider,

    #[error("Payment transaction amount cannot be negative: {amount}")]
    NegativeAmount { amount: Money },

    /// A capture or cancel already went through for the order.
    #[error("A successful {kind} already exists for order {order_id}")]
    AlreadySucceeded {
        order_id: OrderId,
        kind: TransactionType,
    },

    /// An earlier call of the same kind has no final outcome yet.
    #[error("A {kind} for order {order_id} is awaiting provider confirmation ({transaction_id})")]
    InFlight {
        order_id: OrderId,
        kind: TransactionType,
        transaction_id: String,
    },

    #[error("Payment transaction {provider}/{transaction_id} not found")]
    TransactionNotFound {
        provider: String,
        transaction_id: String,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
