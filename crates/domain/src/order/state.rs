//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► PendingAction ──┬──► Paid ──► Captured ──► Shipped ──► Delivered
///           │                    │     │          │                        │
///           ├────────────────────┘     └──────────┴──► Refunded ◄──────────┘
///           └──► Cancelled ◄── PendingAction
/// ```
/// Re-entering the current status is always allowed and changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created, awaiting payment.
    #[default]
    Pending,

    /// The shopper must complete an external step (redirect, 3-D Secure).
    PendingAction,

    /// Payment authorized.
    Paid,

    /// Authorized funds captured.
    Captured,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Cancelled before payment (terminal state).
    Cancelled,

    /// Money returned (terminal state).
    Refunded,
}

impl OrderStatus {
    /// Statuses reachable from this one, excluding itself.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled, PendingAction],
            PendingAction => &[Paid, Cancelled],
            Paid => &[Captured, Refunded],
            Captured => &[Shipped, Refunded],
            Shipped => &[Delivered],
            Delivered => &[Refunded],
            Cancelled | Refunded => &[],
        }
    }

    /// Returns true if moving to `next` is allowed. Same-status moves always are.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        *self == next || self.allowed_transitions().contains(&next)
    }

    /// Returns true while a discount may still change the amount due.
    pub fn can_apply_discount(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PendingAction)
    }

    /// Returns true once the provider has confirmed funds.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Captured | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::PendingAction => "PendingAction",
            OrderStatus::Paid => "Paid",
            OrderStatus::Captured => "Captured",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Refunded => "Refunded",
        }
    }

    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::PendingAction,
        OrderStatus::Paid,
        OrderStatus::Captured,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), Pending);
    }

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Pending, Paid),
            (Pending, Cancelled),
            (Pending, PendingAction),
            (PendingAction, Paid),
            (PendingAction, Cancelled),
            (Paid, Captured),
            (Paid, Refunded),
            (Captured, Shipped),
            (Captured, Refunded),
            (Shipped, Delivered),
            (Delivered, Refunded),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let expected = from == to || allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn test_shipped_cannot_go_back_to_paid() {
        assert!(!Shipped.can_transition_to(Paid));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Cancelled, Refunded]);
    }

    #[test]
    fn test_discount_only_before_payment() {
        assert!(Pending.can_apply_discount());
        assert!(PendingAction.can_apply_discount());
        assert!(!Paid.can_apply_discount());
        assert!(!Cancelled.can_apply_discount());
    }

    #[test]
    fn test_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Draft".parse::<OrderStatus>().is_err());
    }
}
