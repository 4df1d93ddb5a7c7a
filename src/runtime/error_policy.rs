//! # Error Policy
//!
//! What the watch loop does after a failed reconciliation, and how watch stream
//! failures are classified before the stream is restarted.

use crate::controller::ReconcileError;
use crate::crd::RegistryCredentials;
use crate::observability::metrics;
use crate::runtime::context::ControllerContext;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Retry delay for `error`, or `None` when only a spec change can fix it
pub fn retry_delay(ctx: &ControllerContext, key: &str, error: &ReconcileError) -> Option<Duration> {
    if error.is_retryable() {
        Some(ctx.next_error_backoff(key))
    } else {
        None
    }
}

/// Error policy for the `RegistryCredentials` controller
///
/// Configuration errors wait for the next change to the resource. Everything else
/// is retried with a per-resource Fibonacci backoff that resets on success.
pub fn handle_reconciliation_error(
    obj: Arc<RegistryCredentials>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let key = format!("{namespace}/{name}");

    let Some(delay) = retry_delay(&ctx, &key, error) else {
        warn!(
            resource.name = %name,
            resource.namespace = %namespace,
            error = %error,
            "Reconciliation cannot succeed until the spec changes, waiting for an update"
        );
        metrics::increment_requeues_total("await-change");
        return Action::await_change();
    };

    error!(
        resource.name = %name,
        resource.namespace = %namespace,
        error.kind = error.kind_label(),
        error = %error,
        "Reconciliation failed"
    );
    info!(
        resource.name = %name,
        resource.namespace = %namespace,
        "Retrying with Fibonacci backoff in {}s",
        delay.as_secs()
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Watch stream failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401/403: RBAC revoked or service account token invalid
    Unauthorized,
    /// 410: resource version too old, a fresh list fixes it
    Expired,
    /// 429: API server throttling or storage reinitializing
    Throttled,
    /// 404: CRD missing or object gone
    NotFound,
    Other,
}

#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    // 404 first: a plain-text 404 body surfaces as a serde error mentioning WatchFailed
    if error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found")
    {
        WatchErrorClass::NotFound
    } else if error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden")
    {
        WatchErrorClass::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error_string.contains("429")
        || error_string.contains("TooManyRequests")
        || error_string.contains("storage is (re)initializing")
    {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Log a watch stream error and pause where a quick restart would fail again
pub async fn handle_watch_stream_error(error_string: &str, restart_delay: Duration) {
    match classify_watch_error(error_string) {
        WatchErrorClass::Unauthorized => {
            error!(
                error = %error_string,
                "Watch authorization failed - check the controller's ClusterRole allows list/watch on registrycredentials and patch on registrycredentials/status"
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::Expired => {
            warn!(error_type = "410", "Watch resource version expired, relisting");
        }
        WatchErrorClass::Throttled => {
            warn!(
                "API server throttling watch requests, backing off for {}s",
                restart_delay.as_secs()
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::NotFound => {
            warn!(
                error = %error_string,
                "Watched resource not found (404) - the RegistryCredentials CRD may be missing"
            );
        }
        WatchErrorClass::Other => {
            error!(error = %error_string, "Controller stream error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderRegistry;
    use crate::runtime::context::testing::context;
    use crate::runtime::events::testing::RecordingPublisher;
    use crate::store::memory::MemoryStore;
    use crate::store::{SourceId, StoreError};

    fn ctx() -> ControllerContext {
        context(
            Arc::new(MemoryStore::default()),
            ProviderRegistry::builder().build(),
            Arc::new(RecordingPublisher::default()),
        )
    }

    #[test]
    fn test_configuration_error_is_not_retried() {
        let error = ReconcileError::Configuration {
            source_id: SourceId::new("apps", "x"),
            message: "unsupported kind".to_string(),
        };
        assert_eq!(retry_delay(&ctx(), "apps/x", &error), None);
    }

    #[test]
    fn test_store_conflict_backs_off() {
        let ctx = ctx();
        let conflict = || ReconcileError::Store {
            source_id: SourceId::new("apps", "x"),
            error: StoreError::Conflict {
                resource: "apps/x".to_string(),
                message: "resource version changed".to_string(),
            },
        };
        assert_eq!(
            retry_delay(&ctx, "apps/x", &conflict()),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            retry_delay(&ctx, "apps/x", &conflict()),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            retry_delay(&ctx, "apps/x", &conflict()),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("ApiError: Unauthorized (401)"),
            WatchErrorClass::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorClass::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorClass::Throttled
        );
        assert_eq!(
            classify_watch_error("WatchFailed: invalid type: integer `404`"),
            WatchErrorClass::NotFound
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorClass::Other);
    }
}
