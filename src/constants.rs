//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::ControllerConfig`]).

/// Field manager / reporting component name used for status patches and events
pub const CONTROLLER_NAME: &str = "registry-credentials-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default resync period (seconds)
/// Every source is re-reconciled at least this often, even without watch events
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 3600;

/// Default refresh margin (seconds)
/// Expiring credentials are refreshed this long before `expiresAt`
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 600;

/// Minimum refresh interval (seconds)
/// Lower bound for any successful-pass requeue to avoid hammering token services
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default Fibonacci error backoff floor (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci error backoff ceiling (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting the watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default cap on concurrently running reconciliations
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Tolerance applied when deciding whether a scheduled refresh is due (seconds)
pub const REFRESH_DUE_TOLERANCE_SECS: i64 = 2;

/// Secret type understood by kubelet and image pull clients
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the registry config document in a dockerconfigjson secret
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Label marking secrets written by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
