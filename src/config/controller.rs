//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::*;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
/// The value is built once in `main` and shared read-only through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Periodic resync interval (seconds)
    /// Every `RegistryCredentials` is reconciled at least this often
    pub resync_period_secs: u64,
    /// Refresh margin (seconds)
    /// Expiring credentials are refreshed this long before they expire
    pub refresh_margin_secs: u64,
    /// Minimum delay between two successful refreshes of the same source (seconds)
    pub min_refresh_interval_secs: u64,
    /// Fibonacci error backoff floor (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci error backoff ceiling (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after errors or a normal stream end (seconds)
    pub watch_restart_delay_secs: u64,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// Ignored when `RUST_LOG` is set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Endpoint override for the ECR API (local mock servers)
    pub ecr_endpoint_url: Option<String>,
    /// Endpoint override for the STS API (local mock servers)
    pub sts_endpoint_url: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            min_refresh_interval_secs: MIN_REFRESH_INTERVAL_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_namespace: None,
            ecr_endpoint_url: None,
            sts_endpoint_url: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            resync_period_secs: parse_or(
                &lookup,
                "RESYNC_PERIOD_SECS",
                defaults.resync_period_secs,
            ),
            refresh_margin_secs: parse_or(
                &lookup,
                "REFRESH_MARGIN_SECS",
                defaults.refresh_margin_secs,
            ),
            min_refresh_interval_secs: parse_or(
                &lookup,
                "MIN_REFRESH_INTERVAL_SECS",
                defaults.min_refresh_interval_secs,
            ),
            backoff_min_secs: parse_or(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min_secs),
            backoff_max_secs: parse_or(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max_secs),
            watch_restart_delay_secs: parse_or(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT").unwrap_or(defaults.log_format),
            max_concurrent_reconciliations: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            watch_namespace: non_empty(lookup("WATCH_NAMESPACE")),
            ecr_endpoint_url: non_empty(lookup("ECR_ENDPOINT_URL")),
            sts_endpoint_url: non_empty(lookup("STS_ENDPOINT_URL")),
        }
    }

    /// Get resync period duration
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    /// Get refresh margin duration
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    /// Get minimum refresh interval duration
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        !self.log_format.eq_ignore_ascii_case("text")
    }
}

/// Read a key and parse it, falling back to the default when unset or unparseable
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.resync_period(), Duration::from_secs(3600));
        assert!(config.json_logs());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RESYNC_PERIOD_SECS", "900"),
            ("METRICS_PORT", "9090"),
            ("LOG_FORMAT", "text"),
            ("WATCH_NAMESPACE", "registry-system"),
            ("ECR_ENDPOINT_URL", "http://localhost:4566"),
        ]));
        assert_eq!(config.resync_period_secs, 900);
        assert_eq!(config.metrics_port, 9090);
        assert!(!config.json_logs());
        assert_eq!(config.watch_namespace.as_deref(), Some("registry-system"));
        assert_eq!(
            config.ecr_endpoint_url.as_deref(),
            Some("http://localhost:4566")
        );
        assert_eq!(config.sts_endpoint_url, None);
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("RESYNC_PERIOD_SECS", "one hour"),
            ("WATCH_NAMESPACE", "  "),
        ]));
        assert_eq!(config.resync_period_secs, DEFAULT_RESYNC_PERIOD_SECS);
        assert_eq!(config.watch_namespace, None);
    }
}
