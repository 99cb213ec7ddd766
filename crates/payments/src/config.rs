//! Gateway configuration loaded from environment variables.

use std::time::Duration;

const DEFAULT_PROVIDERS: &[&str] = &["sandbox", "manual"];
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gateway configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `PAYMENT_PROVIDERS`: comma-separated list of enabled provider keys (default: `"sandbox,manual"`)
/// - `PAYMENT_TIMEOUT_SECS`: per-call provider timeout (default: `30`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub enabled_providers: Vec<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("PAYMENT_PROVIDERS").ok().as_deref(),
            std::env::var("PAYMENT_TIMEOUT_SECS").ok().as_deref(),
        )
    }

    fn from_vars(providers: Option<&str>, timeout_secs: Option<&str>) -> Self {
        let enabled_providers = match providers {
            Some(list) => list
                .split(',')
                .map(|key| key.trim().to_ascii_lowercase())
                .filter(|key| !key.is_empty())
                .collect(),
            None => DEFAULT_PROVIDERS.iter().map(|key| key.to_string()).collect(),
        };

        let secs = timeout_secs
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            enabled_providers,
            timeout: Duration::from_secs(secs),
        }
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled_providers.iter().any(|k| k == key)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_vars(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = GatewayConfig::default();
        assert!(config.is_enabled("sandbox"));
        assert!(config.is_enabled("manual"));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_provider_list_is_normalized() {
        let config = GatewayConfig::from_vars(Some(" Sandbox , ,manual"), Some("5"));
        assert_eq!(config.enabled_providers, vec!["sandbox", "manual"]);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_list_disables_everything() {
        let config = GatewayConfig::from_vars(Some(""), Some("zero"));
        assert!(config.enabled_providers.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
