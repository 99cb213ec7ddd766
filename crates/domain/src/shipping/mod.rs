//! Shipping zones, rates and cost calculation.

mod address;
mod rate;
mod repository;
mod service;
mod zone;

pub use address::Address;
pub use rate::{ShippingMethod, ShippingRate, ValueTier, WeightTier};
pub use repository::{InMemoryShippingRepository, ShippingRepository};
pub use service::{ShippingOption, ShippingQuote, ShippingService};
pub use zone::ShippingZone;

use common::{ShippingMethodId, ShippingRateId};
use thiserror::Error;

use crate::money::Money;
use crate::repository::RepositoryError;

/// Errors that can occur while configuring or selecting shipping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShippingError {
    /// A required address field is blank.
    #[error("Address field is required: {field}")]
    InvalidAddress { field: String },

    /// Tier bounds are inverted.
    #[error("Invalid tier: minimum {min} exceeds maximum {max}")]
    InvalidTier { min: String, max: String },

    /// A configured amount is negative.
    #[error("{field} cannot be negative: {amount}")]
    NegativeAmount { field: &'static str, amount: Money },

    /// The rate does not exist.
    #[error("Shipping rate not found: {0}")]
    RateNotFound(ShippingRateId),

    /// The rate's method does not exist.
    #[error("Shipping method not found: {0}")]
    MethodNotFound(ShippingMethodId),

    /// The rate exists but is not offered for this address and order value.
    #[error("Shipping rate {0} is not available for this address")]
    RateNotAvailable(ShippingRateId),

    /// A shipping address must be set before choosing a method.
    #[error("A shipping address is required before selecting shipping")]
    MissingAddress,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
