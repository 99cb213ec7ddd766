//! Shared identifiers for the storefront engine.

mod types;

pub use types::{
    CategoryId, CheckoutId, DiscountId, OrderId, ProductId, SessionId, ShippingMethodId,
    ShippingRateId, ShippingZoneId, TransactionRowId, UserId, VariantId, Version,
};
