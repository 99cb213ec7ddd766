//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout session.
///
/// State transitions:
/// ```text
///          ┌──► Completed
/// Active ──┼──► Abandoned
///          └──► Expired
/// ```
/// Every state other than `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutStatus {
    /// Shopper is still editing the session.
    #[default]
    Active,

    /// Converted into an order (terminal state).
    Completed,

    /// Given up on by the shopper (terminal state).
    Abandoned,

    /// Passed its expiry while still active (terminal state).
    Expired,
}

impl CheckoutStatus {
    /// Returns true if items, addresses, shipping or discounts can change.
    pub fn can_mutate(&self) -> bool {
        matches!(self, CheckoutStatus::Active)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !self.can_mutate()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Active => "Active",
            CheckoutStatus::Completed => "Completed",
            CheckoutStatus::Abandoned => "Abandoned",
            CheckoutStatus::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
