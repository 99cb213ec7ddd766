//! Human-readable order numbers.

use chrono::{DateTime, NaiveDate, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

const REGISTERED_PREFIX: &str = "ORD";
const GUEST_PREFIX: &str = "GS";
const PROVISIONAL_SUFFIX: &str = "TEMP";

/// An order number such as `ORD-20260314-000042`.
///
/// Orders start with a provisional `...-TEMP` number because the sequence
/// part is the storage id, which only exists after the first insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Provisional number for an order created at `created_at`.
    pub fn provisional(guest: bool, created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}-{}",
            prefix(guest),
            datestamp(created_at.date_naive()),
            PROVISIONAL_SUFFIX
        ))
    }

    /// Final number for a stored order.
    pub fn finalized(guest: bool, created_at: DateTime<Utc>, id: OrderId) -> Self {
        Self(format!(
            "{}-{}-{:06}",
            prefix(guest),
            datestamp(created_at.date_naive()),
            id.as_i64()
        ))
    }

    /// Wraps a number read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_provisional(&self) -> bool {
        self.0.ends_with(PROVISIONAL_SUFFIX)
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn prefix(guest: bool) -> &'static str {
    if guest { GUEST_PREFIX } else { REGISTERED_PREFIX }
}

fn datestamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_provisional_numbers() {
        let registered = OrderNumber::provisional(false, created());
        assert_eq!(registered.as_str(), "ORD-20260314-TEMP");
        assert!(registered.is_provisional());

        let guest = OrderNumber::provisional(true, created());
        assert_eq!(guest.as_str(), "GS-20260314-TEMP");
        assert!(guest.is_guest());
    }

    #[test]
    fn test_finalized_number_is_zero_padded() {
        let number = OrderNumber::finalized(false, created(), OrderId::new(42));
        assert_eq!(number.as_str(), "ORD-20260314-000042");
        assert!(!number.is_provisional());

        let big = OrderNumber::finalized(true, created(), OrderId::new(12_345_678));
        assert_eq!(big.as_str(), "GS-20260314-12345678");
    }
}
