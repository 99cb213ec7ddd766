//! Store-wide settings loaded from environment variables.

use chrono::Duration;

use crate::money::CurrencyCode;

const DEFAULT_CHECKOUT_TTL_HOURS: i64 = 24;

/// Store configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `STORE_DEFAULT_CURRENCY`: currency for new checkouts and ledger rows (default: `"USD"`)
/// - `CHECKOUT_TTL_HOURS`: lifetime of a checkout session (default: `24`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub default_currency: CurrencyCode,
    pub checkout_ttl: Duration,
}

impl StoreConfig {
    /// Loads configuration from environment variables, falling back to defaults
    /// for anything missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("STORE_DEFAULT_CURRENCY").ok().as_deref(),
            std::env::var("CHECKOUT_TTL_HOURS").ok().as_deref(),
        )
    }

    fn from_vars(currency: Option<&str>, ttl_hours: Option<&str>) -> Self {
        let default_currency = match currency.map(CurrencyCode::new) {
            Some(Ok(code)) => code,
            Some(Err(error)) => {
                tracing::warn!(%error, "Ignoring STORE_DEFAULT_CURRENCY");
                CurrencyCode::default()
            }
            None => CurrencyCode::default(),
        };

        let hours = ttl_hours
            .and_then(|h| h.trim().parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_CHECKOUT_TTL_HOURS);

        Self {
            default_currency,
            checkout_ttl: Duration::hours(hours),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_currency: CurrencyCode::default(),
            checkout_ttl: Duration::hours(DEFAULT_CHECKOUT_TTL_HOURS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = StoreConfig::default();
        assert_eq!(config.default_currency.as_str(), "USD");
        assert_eq!(config.checkout_ttl, Duration::hours(24));
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = StoreConfig::from_vars(Some("eur"), Some("2"));
        assert_eq!(config.default_currency.as_str(), "EUR");
        assert_eq!(config.checkout_ttl, Duration::hours(2));
    }

    #[test]
    fn test_bad_vars_fall_back() {
        let config = StoreConfig::from_vars(Some("euro"), Some("-3"));
        assert_eq!(config, StoreConfig::default());
    }
}
