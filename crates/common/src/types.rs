use serde::{Deserialize, Serialize};

/// Declares a storage-assigned numeric identifier.
///
/// Identifiers wrap the `i64` primary key handed out by the persistence layer.
/// Zero is never a valid identifier; `is_assigned` is the check callers use
/// before trusting one that came from outside the engine.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }

            /// Returns true if the identifier refers to a stored entity (non-zero, positive).
            pub const fn is_assigned(&self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a checkout session.
    CheckoutId
);
numeric_id!(
    /// Identifier of a placed order.
    OrderId
);
numeric_id!(
    /// Identifier of a catalog product.
    ProductId
);
numeric_id!(
    /// Identifier of a product variant.
    VariantId
);
numeric_id!(
    /// Identifier of a catalog category.
    CategoryId
);
numeric_id!(
    /// Identifier of a registered user.
    UserId
);
numeric_id!(
    /// Identifier of a discount definition.
    DiscountId
);
numeric_id!(
    /// Identifier of a shipping zone.
    ShippingZoneId
);
numeric_id!(
    /// Identifier of a shipping method.
    ShippingMethodId
);
numeric_id!(
    /// Identifier of a shipping rate.
    ShippingRateId
);
numeric_id!(
    /// Identifier of a stored payment transaction row.
    TransactionRowId
);

/// Opaque session token identifying a guest shopper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id from a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the token is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Version number of a stored aggregate, used for optimistic concurrency control.
///
/// A freshly constructed aggregate is at version 0; every successful save
/// increments it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of an unsaved aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version after the first save.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_assignment() {
        assert!(OrderId::new(42).is_assigned());
        assert!(!OrderId::new(0).is_assigned());
        assert!(!ProductId::new(-3).is_assigned());
    }

    #[test]
    fn numeric_id_serializes_transparently() {
        let id = CheckoutId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let deserialized: CheckoutId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn session_id_blank_detection() {
        assert!(SessionId::new("   ").is_blank());
        assert!(!SessionId::new("sess-1").is_blank());
    }

    #[test]
    fn version_sequence() {
        assert_eq!(Version::default(), Version::initial());
        assert_eq!(Version::initial().next(), Version::first());
        assert_eq!(Version::new(4).next().as_i64(), 5);
    }
}
