//! Payment transaction rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, TransactionRowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LedgerError;
use crate::money::{CurrencyCode, Money};

/// What a provider call did with the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Authorize,
    Capture,
    Refund,
    Cancel,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Authorize,
        TransactionType::Capture,
        TransactionType::Refund,
        TransactionType::Cancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Authorize => "authorize",
            TransactionType::Capture => "capture",
            TransactionType::Refund => "refund",
            TransactionType::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown transaction type: {s}"))
    }
}

/// Outcome of a transaction as far as the provider has told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Outcome unknown: awaiting asynchronous confirmation or reconciliation.
    Pending,
    Successful,
    Failed,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 3] = [
        TransactionStatus::Pending,
        TransactionStatus::Successful,
        TransactionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown transaction status: {s}"))
    }
}

/// One recorded provider interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Option<TransactionRowId>,
    pub order_id: OrderId,
    pub transaction_id: String,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: Money,
    pub currency: CurrencyCode,
    pub provider: String,
    pub raw_response: Option<Value>,
    /// The provider could not be reached; the outcome must be looked up later.
    pub reconcile: bool,
    /// Free-form annotations such as the order number or the action URL.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Successful
    }
}

/// A transaction about to be appended to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub order_id: OrderId,
    pub transaction_id: String,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: Money,
    /// Falls back to the store currency when absent.
    pub currency: Option<CurrencyCode>,
    pub provider: String,
    pub raw_response: Option<Value>,
    pub reconcile: bool,
    pub metadata: BTreeMap<String, String>,
}

impl NewTransaction {
    pub fn new(
        order_id: OrderId,
        transaction_id: impl Into<String>,
        kind: TransactionType,
        status: TransactionStatus,
        amount: Money,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            transaction_id: transaction_id.into(),
            kind,
            status,
            amount,
            currency: None,
            provider: provider.into(),
            raw_response: None,
            reconcile: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn with_raw_response(mut self, raw: Value) -> Self {
        self.raw_response = Some(raw);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn needing_reconciliation(mut self) -> Self {
        self.reconcile = true;
        self
    }

    /// Validates the row and fills in defaults, producing an unstored transaction.
    pub fn prepare(
        self,
        default_currency: &CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransaction, LedgerError> {
        if !self.order_id.is_assigned() {
            return Err(LedgerError::MissingOrderId);
        }
        if self.transaction_id.trim().is_empty() {
            return Err(LedgerError::MissingTransactionId);
        }
        if self.provider.trim().is_empty() {
            return Err(LedgerError::MissingProvider);
        }
        if self.amount.is_negative() {
            return Err(LedgerError::NegativeAmount {
                amount: self.amount,
            });
        }

        Ok(PaymentTransaction {
            id: None,
            order_id: self.order_id,
            transaction_id: self.transaction_id,
            kind: self.kind,
            status: self.status,
            amount: self.amount,
            currency: self.currency.unwrap_or_else(|| default_currency.clone()),
            provider: self.provider,
            raw_response: self.raw_response,
            reconcile: self.reconcile,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        })
    }
}
