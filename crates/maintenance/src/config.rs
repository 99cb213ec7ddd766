//! Maintenance configuration loaded from environment variables.

use std::time::Duration;

use crate::error::MaintenanceError;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_METRICS_PORT: u16 = 9100;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BATCH_SIZE: usize = 500;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Settings for the maintenance process.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `SWEEP_INTERVAL_SECS`: pause between job runs (default: `300`)
/// - `METRICS_PORT`: Prometheus scrape port (default: `9100`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for structured output, anything else for text
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `MAINTENANCE_BATCH_SIZE`: rows handled per job run (default: `500`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    pub database_url: String,
    pub sweep_interval: Duration,
    pub metrics_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub max_connections: u32,
    pub batch_size: usize,
}

impl MaintenanceConfig {
    pub fn from_env() -> Result<Self, MaintenanceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparsable values fall
    /// back to their defaults; only the database URL is mandatory.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MaintenanceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(MaintenanceError::MissingDatabaseUrl)?;

        let interval_secs = parse(&lookup, "SWEEP_INTERVAL_SECS")
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let log_format = match lookup("LOG_FORMAT") {
            Some(format) if format.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(interval_secs),
            metrics_port: parse(&lookup, "METRICS_PORT").unwrap_or(DEFAULT_METRICS_PORT),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format,
            max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            batch_size: parse(&lookup, "MAINTENANCE_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<MaintenanceConfig, MaintenanceError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MaintenanceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/shop")]).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/shop");
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.batch_size, 500);
    }

    #[test]
    fn test_database_url_required() {
        assert!(matches!(load(&[]), Err(MaintenanceError::MissingDatabaseUrl)));
        assert!(matches!(
            load(&[("DATABASE_URL", "  ")]),
            Err(MaintenanceError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("METRICS_PORT", "9999"),
            ("RUST_LOG", "maintenance=debug"),
            ("LOG_FORMAT", "JSON"),
            ("MAINTENANCE_BATCH_SIZE", "50"),
        ])
        .unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.metrics_port, 9999);
        assert_eq!(config.log_level, "maintenance=debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/shop"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("METRICS_PORT", "not-a-port"),
        ])
        .unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.metrics_port, 9100);
    }
}
