//! # Kubernetes Events
//!
//! Events on `RegistryCredentials` objects, visible via `kubectl describe`.
//!
//! Publishing is fire-and-forget: a failed event is logged and never fails a reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource_ref`; never fails
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// [`EventPublisher`] backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// `controller_name` is reported as the event's reporting component
    #[must_use]
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons (REASON column of `kubectl get events`)
pub mod reasons {
    /// The pull secret was created or rewritten with a fresh credential
    pub const CREDENTIALS_SYNCED: &str = "CredentialsSynced";
    /// Unsupported kind or malformed spec; waiting for a spec change
    pub const CONFIGURATION_INVALID: &str = "ConfigurationInvalid";
    /// Deletion observed; credential refresh stopped
    pub const TERMINATING: &str = "Terminating";
}

/// Event actions (ACTION column of `kubectl get events`)
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const REFRESH: &str = "Refresh";
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPublisher;
    use super::*;

    #[test]
    fn test_reason_constants_are_pascal_case() {
        assert_eq!(reasons::CREDENTIALS_SYNCED, "CredentialsSynced");
        assert_eq!(reasons::CONFIGURATION_INVALID, "ConfigurationInvalid");
        assert_eq!(reasons::TERMINATING, "Terminating");
    }

    #[tokio::test]
    async fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::default();
        let obj_ref = ObjectReference::default();
        publisher
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::CREDENTIALS_SYNCED,
                actions::REFRESH,
                None,
            )
            .await;
        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                reasons::CONFIGURATION_INVALID,
                actions::RECONCILE,
                Some("unsupported kind".to_string()),
            )
            .await;

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].0, EventType::Warning);
        assert_eq!(events[1].1, reasons::CONFIGURATION_INVALID);
    }
}
