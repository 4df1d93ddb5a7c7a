//! # Phase State Machine
//!
//! Sole writer of `status.phase`.
//!
//! ```text
//! (none) --Observed--> Provisioning --Synced--> Active
//!                           ^                     |
//!                           +--CredentialExpired--+
//! any --DeletionRequested--> Terminating (absorbing)
//! ```
//!
//! Failed fetches and syncs produce no event, so the phase never regresses on error.

use crate::crd::{Phase, RegistryCredentialsStatus};
use crate::store::{CredentialSource, SourceStore, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use tracing::{debug, info};

/// Bookkeeping written together with a successful refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRecord {
    pub registry_host: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshed_at: DateTime<Utc>,
    pub next_refresh_at: DateTime<Utc>,
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The source was seen for the first time
    Observed,
    /// The recorded credential is past its expiry
    CredentialExpired,
    /// Fetch and sync both succeeded
    Synced(RefreshRecord),
    /// The source is being deleted
    DeletionRequested,
}

impl PhaseEvent {
    fn name(&self) -> &'static str {
        match self {
            PhaseEvent::Observed => "observed",
            PhaseEvent::CredentialExpired => "credential_expired",
            PhaseEvent::Synced(_) => "synced",
            PhaseEvent::DeletionRequested => "deletion_requested",
        }
    }
}

/// Phase after `event`, given the current phase
#[must_use]
pub fn next_phase(current: Option<Phase>, event: &PhaseEvent) -> Option<Phase> {
    match (current, event) {
        (Some(Phase::Terminating), _) | (_, PhaseEvent::DeletionRequested) => {
            Some(Phase::Terminating)
        }
        (None, PhaseEvent::Observed) | (Some(Phase::Active), PhaseEvent::CredentialExpired) => {
            Some(Phase::Provisioning)
        }
        (_, PhaseEvent::Synced(_)) => Some(Phase::Active),
        (current, PhaseEvent::Observed | PhaseEvent::CredentialExpired) => current,
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Status after `event`; refresh fields change only when a sync lands the source in `Active`
#[must_use]
pub fn next_status(
    current: &RegistryCredentialsStatus,
    event: &PhaseEvent,
) -> RegistryCredentialsStatus {
    let phase = next_phase(current.phase, event);
    match event {
        PhaseEvent::Synced(record) if phase == Some(Phase::Active) => RegistryCredentialsStatus {
            phase,
            registry_host: Some(record.registry_host.clone()),
            expires_at: record.expires_at.map(rfc3339),
            last_refresh_time: Some(rfc3339(record.refreshed_at)),
            next_refresh_time: Some(rfc3339(record.next_refresh_at)),
            observed_generation: record.observed_generation,
        },
        _ => RegistryCredentialsStatus {
            phase,
            ..current.clone()
        },
    }
}

/// Applies phase events to a source and persists the result
pub struct PhaseStateMachine<'a> {
    store: &'a dyn SourceStore,
}

impl fmt::Debug for PhaseStateMachine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseStateMachine").finish_non_exhaustive()
    }
}

impl<'a> PhaseStateMachine<'a> {
    #[must_use]
    pub fn new(store: &'a dyn SourceStore) -> Self {
        Self { store }
    }

    /// Apply `event` to `source`, writing status only when it changes
    ///
    /// Returns the resulting phase. On success `source.status` reflects what was persisted.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Store errors (including optimistic concurrency conflicts) are returned unchanged"
    )]
    pub async fn advance(
        &self,
        source: &mut CredentialSource,
        event: PhaseEvent,
    ) -> Result<Option<Phase>, StoreError> {
        let status = next_status(&source.status, &event);
        if status == source.status {
            debug!(
                source = %source.id,
                event = event.name(),
                phase = ?status.phase,
                "Skipping status update - status unchanged"
            );
            return Ok(status.phase);
        }

        let from = source.status.phase;
        let to = status.phase;
        self.store.update_status(source, status).await?;
        if from != to {
            info!(
                source = %source.id,
                event = event.name(),
                from = from.map_or("none", |p| p.as_str()),
                to = to.map_or("none", |p| p.as_str()),
                "Phase transition"
            );
        }
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::source;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn record(host: &str) -> RefreshRecord {
        let now = Utc::now();
        RefreshRecord {
            registry_host: host.to_string(),
            expires_at: None,
            refreshed_at: now,
            next_refresh_at: now + Duration::hours(1),
            observed_generation: Some(1),
        }
    }

    #[test]
    fn test_terminating_absorbs_every_event() {
        let events = [
            PhaseEvent::Observed,
            PhaseEvent::CredentialExpired,
            PhaseEvent::Synced(record("h")),
            PhaseEvent::DeletionRequested,
        ];
        for event in &events {
            assert_eq!(
                next_phase(Some(Phase::Terminating), event),
                Some(Phase::Terminating)
            );
        }
    }

    #[test]
    fn test_observed_only_moves_unset_phase() {
        assert_eq!(next_phase(None, &PhaseEvent::Observed), Some(Phase::Provisioning));
        assert_eq!(
            next_phase(Some(Phase::Active), &PhaseEvent::Observed),
            Some(Phase::Active)
        );
    }

    #[test]
    fn test_non_sync_transitions_keep_refresh_fields() {
        let current = next_status(
            &RegistryCredentialsStatus::default(),
            &PhaseEvent::Synced(record("https://index.docker.io/v1/")),
        );
        let expired = next_status(&current, &PhaseEvent::CredentialExpired);
        assert_eq!(expired.phase, Some(Phase::Provisioning));
        assert_eq!(expired.registry_host, current.registry_host);
        assert_eq!(expired.last_refresh_time, current.last_refresh_time);
    }

    #[tokio::test]
    async fn test_advance_writes_once_per_change() {
        let store = MemoryStore::default();
        let src = source("pull", serde_json::json!({ "kind": "BasicAuth" }));
        store.insert_source(src.clone());
        let mut src = store.source(&src.id).unwrap();
        let machine = PhaseStateMachine::new(&store);

        let phase = machine.advance(&mut src, PhaseEvent::Observed).await.unwrap();
        assert_eq!(phase, Some(Phase::Provisioning));
        let phase = machine.advance(&mut src, PhaseEvent::Observed).await.unwrap();
        assert_eq!(phase, Some(Phase::Provisioning));

        assert_eq!(store.writes().len(), 1);
        assert_eq!(
            store.source(&src.id).unwrap().status.phase,
            Some(Phase::Provisioning)
        );
    }

    #[tokio::test]
    async fn test_advance_surfaces_stale_write_as_conflict() {
        let store = MemoryStore::default();
        let src = source("pull", serde_json::json!({ "kind": "BasicAuth" }));
        store.insert_source(src.clone());
        let mut stale = store.source(&src.id).unwrap();
        stale.resource_version = Some("0".to_string());

        let err = PhaseStateMachine::new(&store)
            .advance(&mut stale, PhaseEvent::Observed)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
