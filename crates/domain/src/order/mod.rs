//! Order aggregate and related types.

mod aggregate;
mod events;
mod number;
mod repository;
mod service;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use events::{DiscountAppliedData, OrderEvent, OrderPlacedData, StatusChangedData};
pub use number::OrderNumber;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::{OrderService, RepairReport};
pub use state::OrderStatus;
pub use value_objects::{GuestContact, OrderItem, OrderOwner, OrderShippingMethod, OrderTotals};

use thiserror::Error;

use crate::discount::DiscountError;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Guest orders need a contact email.
    #[error("Guest orders require an email address")]
    GuestEmailRequired,

    /// Requested status is not reachable from the current one.
    #[error("Invalid state transition: cannot move from {current_state} to {requested}")]
    InvalidStateTransition {
        current_state: OrderStatus,
        requested: OrderStatus,
    },

    /// Shipping needs a carrier tracking code.
    #[error("Tracking code is required to ship an order")]
    TrackingCodeRequired,

    /// The order is past the point where its amount can change.
    #[error("Cannot apply a discount to an order in {current_state} state")]
    DiscountNotAllowed { current_state: OrderStatus },

    #[error("Discount error: {0}")]
    Discount(#[from] DiscountError),
}
