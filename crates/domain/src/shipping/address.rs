//! Postal addresses.

use serde::{Deserialize, Serialize};

use super::ShippingError;

/// A postal address used for shipping and billing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    /// State, province or region code; empty where the country has none.
    pub state: String,
    pub postal_code: String,
    /// ISO country code.
    pub country: String,
    pub phone: Option<String>,
}

impl Address {
    /// Creates an address with the fields zone matching relies on.
    pub fn new(
        line1: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        postal_code: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            line1: line1.into(),
            city: city.into(),
            state: state.into(),
            postal_code: postal_code.into(),
            country: country.into(),
            ..Self::default()
        }
    }

    pub fn with_recipient(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    /// Checks that the fields needed to ship are present.
    pub fn validate(&self) -> Result<(), ShippingError> {
        let missing = [
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match missing {
            Some((field, _)) => Err(ShippingError::InvalidAddress {
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }
}
