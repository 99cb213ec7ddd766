//! Checkout aggregate and related types.

mod aggregate;
mod merge;
mod repository;
mod service;
mod state;
mod sweeper;
mod value_objects;

pub use aggregate::Checkout;
pub use repository::{CheckoutRepository, InMemoryCheckoutRepository};
pub use service::{CheckoutDependencies, CheckoutService};
pub use state::CheckoutStatus;
pub use sweeper::{CheckoutSweeper, SweepReport};
pub use value_objects::{CheckoutItem, CustomerDetails, ItemKey, Owner, ShippingSelection};

use chrono::{DateTime, Utc};
use common::{ProductId, VariantId};
use thiserror::Error;

use crate::discount::DiscountError;
use crate::money::Money;
use crate::order::OrderError;
use crate::shipping::ShippingError;

/// Errors that can occur during checkout operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Guest session is blank or user id is not a stored id.
    #[error("Invalid checkout owner: {reason}")]
    InvalidOwner { reason: &'static str },

    /// Product id is zero or negative.
    #[error("Invalid product id: {product_id}")]
    InvalidProductId { product_id: ProductId },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} (must not be negative)")]
    NegativePrice { price: Money },

    /// A line amount or the checkout total would not fit in minor units.
    #[error("Checkout amounts exceed the supported range")]
    AmountOverflow,

    /// Line not found in the checkout.
    #[error("Item not found: product {product_id}")]
    ItemNotFound {
        product_id: ProductId,
        variant_id: Option<VariantId>,
    },

    /// Checkout is not in a state that allows the action.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: CheckoutStatus,
        action: &'static str,
    },

    /// Checkout is still marked active but its expiry has passed.
    #[error("Checkout expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },

    /// Checkout has no items.
    #[error("Checkout has no items")]
    NoItems,

    /// A shipping address is needed first.
    #[error("A shipping address is required")]
    MissingShippingAddress,

    /// Guests must leave an email address before completing.
    #[error("Customer email is required for guest checkout")]
    MissingCustomerEmail,

    #[error("Discount error: {0}")]
    Discount(#[from] DiscountError),

    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}
