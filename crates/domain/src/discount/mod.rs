//! Discount definitions, evaluation and storage contracts.

mod applied;
mod engine;
mod model;
mod repository;

pub use applied::AppliedDiscount;
pub use engine::{DiscountTargets, Priceable, PriceableLine};
pub use model::{
    Discount, DiscountKind, DiscountMethod, DiscountRule, ValidityWindow, normalize_code,
};
pub use repository::{
    CategoryResolver, DiscountRepository, InMemoryCatalog, InMemoryDiscountRepository,
    resolve_targets,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::money::Money;

/// Errors that can occur while defining or redeeming a discount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    /// Discount code is empty.
    #[error("Discount code is required")]
    EmptyCode,

    /// Value is not usable (zero fixed amount, zero percentage).
    #[error("Invalid discount value: {0}")]
    InvalidValue(String),

    /// Product discount without any product or category restriction.
    #[error("Product discounts must target at least one product or category")]
    MissingProductRestriction,

    /// Validity window is empty or inverted.
    #[error("Invalid validity window: {starts_at} is not before {ends_at}")]
    InvalidWindow {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    /// No discount exists for the code.
    #[error("Discount code not found: {code}")]
    UnknownCode { code: String },

    /// Discount is switched off.
    #[error("Discount {code} is not active")]
    Inactive { code: String },

    /// Validity window has not started.
    #[error("Discount {code} is not valid before {starts_at}")]
    NotYetValid {
        code: String,
        starts_at: DateTime<Utc>,
    },

    /// Validity window has ended.
    #[error("Discount {code} expired at {ended_at}")]
    Expired {
        code: String,
        ended_at: DateTime<Utc>,
    },

    /// All redemptions are used up.
    #[error("Discount {code} has reached its usage limit")]
    UsageLimitReached { code: String },

    /// Order total is below the discount's threshold.
    #[error("Order total {total} is below the minimum of {minimum}")]
    BelowMinimumOrder { minimum: Money, total: Money },

    /// Product discount matched none of the line items.
    #[error("Discount does not apply to any item")]
    NoMatchingItems,

    /// The computed discount is not positive.
    #[error("Discount {code} yields no reduction for this order")]
    ZeroAmount { code: String },
}
