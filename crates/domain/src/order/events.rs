//! Order milestones dispatched to notifications.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::{CurrencyCode, Money};

use super::{OrderNumber, OrderStatus};

/// Milestones in an order's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was stored and numbered.
    OrderPlaced(OrderPlacedData),

    /// Order moved to a different status.
    StatusChanged(StatusChangedData),

    /// A discount changed the amount due.
    DiscountApplied(DiscountAppliedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(data) => match data.to {
                OrderStatus::Pending => "OrderPending",
                OrderStatus::PendingAction => "OrderPaymentActionRequired",
                OrderStatus::Paid => "OrderPaid",
                OrderStatus::Captured => "OrderPaymentCaptured",
                OrderStatus::Shipped => "OrderShipped",
                OrderStatus::Delivered => "OrderDelivered",
                OrderStatus::Cancelled => "OrderCancelled",
                OrderStatus::Refunded => "OrderRefunded",
            },
            OrderEvent::DiscountApplied(_) => "OrderDiscountApplied",
        }
    }
}

impl OrderEvent {
    /// The order the event is about, if it had been stored.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            OrderEvent::OrderPlaced(data) => Some(data.order_id),
            OrderEvent::StatusChanged(data) => data.order_id,
            OrderEvent::DiscountApplied(data) => data.order_id,
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub final_amount: Money,
    pub currency: CurrencyCode,
    /// Guest email, absent for registered customers.
    pub guest_email: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub order_id: Option<OrderId>,
    pub order_number: OrderNumber,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Carrier tracking code, set when shipping.
    pub tracking_code: Option<String>,
    /// Redirect the shopper must follow, set when payment needs action.
    pub action_url: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Data for DiscountApplied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountAppliedData {
    pub order_id: Option<OrderId>,
    pub code: String,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(to: OrderStatus) -> OrderEvent {
        OrderEvent::StatusChanged(StatusChangedData {
            order_id: Some(OrderId::new(1)),
            order_number: OrderNumber::from_stored("ORD-20260101-000001"),
            from: OrderStatus::Pending,
            to,
            tracking_code: None,
            action_url: None,
            changed_at: Utc::now(),
        })
    }

    #[test]
    fn test_template_name_follows_target_status() {
        assert_eq!(status_event(OrderStatus::Paid).event_type(), "OrderPaid");
        assert_eq!(status_event(OrderStatus::Shipped).event_type(), "OrderShipped");
        assert_eq!(status_event(OrderStatus::Refunded).event_type(), "OrderRefunded");
    }

    #[test]
    fn test_serialization_is_tagged() {
        let json = serde_json::to_value(status_event(OrderStatus::Cancelled)).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["to"], "Cancelled");
        assert_eq!(json["data"]["order_number"], "ORD-20260101-000001");
    }
}
