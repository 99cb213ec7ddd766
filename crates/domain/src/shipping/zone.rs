//! Shipping zones and hierarchical address matching.

use common::ShippingZoneId;
use serde::{Deserialize, Serialize};

use super::Address;

/// A geographic area shipping rates are attached to.
///
/// Matching is hierarchical: country, then state, then postal code. An empty
/// criterion list matches everything at that level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZone {
    pub id: Option<ShippingZoneId>,
    pub name: String,
    pub countries: Vec<String>,
    pub states: Vec<String>,
    pub zip_codes: Vec<String>,
    pub active: bool,
}

impl ShippingZone {
    /// Creates an active zone that matches every address.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            countries: Vec::new(),
            states: Vec::new(),
            zip_codes: Vec::new(),
            active: true,
        }
    }

    pub fn with_countries<S: Into<String>>(mut self, countries: impl IntoIterator<Item = S>) -> Self {
        self.countries = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_states<S: Into<String>>(mut self, states: impl IntoIterator<Item = S>) -> Self {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_zip_codes<S: Into<String>>(mut self, zip_codes: impl IntoIterator<Item = S>) -> Self {
        self.zip_codes = zip_codes.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the address falls inside this zone.
    pub fn matches(&self, address: &Address) -> bool {
        self.active
            && matches_code(&self.countries, &address.country)
            && matches_code(&self.states, &address.state)
            && matches_postal(&self.zip_codes, &address.postal_code)
    }
}

fn matches_code(allowed: &[String], value: &str) -> bool {
    allowed.is_empty()
        || allowed
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(value.trim()))
}

fn matches_postal(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|zip| zip.trim() == value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us_address() -> Address {
        Address::new("1 Main St", "Austin", "TX", "73301", "US")
    }

    #[test]
    fn test_empty_zone_matches_everything() {
        let zone = ShippingZone::new("World");
        assert!(zone.matches(&us_address()));
        assert!(zone.matches(&Address::new("x", "Toronto", "ON", "M5H", "CA")));
    }

    #[test]
    fn test_country_mismatch() {
        let zone = ShippingZone::new("US").with_countries(["US"]);
        assert!(zone.matches(&us_address()));
        assert!(!zone.matches(&Address::new("x", "Toronto", "ON", "M5H", "CA")));
    }

    #[test]
    fn test_state_and_zip_levels() {
        let zone = ShippingZone::new("Texas")
            .with_countries(["us"])
            .with_states(["tx"]);
        assert!(zone.matches(&us_address()));

        let zip_zone = ShippingZone::new("Downtown")
            .with_countries(["US"])
            .with_states(["TX"])
            .with_zip_codes(["73301"]);
        assert!(zip_zone.matches(&us_address()));

        let other = Address::new("1 Main St", "Austin", "TX", "78701", "US");
        assert!(!zip_zone.matches(&other));
    }

    #[test]
    fn test_inactive_zone_never_matches() {
        let mut zone = ShippingZone::new("World");
        zone.active = false;
        assert!(!zone.matches(&us_address()));
    }
}
