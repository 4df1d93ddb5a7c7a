//! # Reconciliation Engine
//!
//! One pass over one credential source: load, decide the lifecycle step, fetch a
//! credential, converge the pull secret, record the result.
//!
//! The engine never sleeps, retries or locks. Retry timing belongs to the caller
//! (see `runtime::error_policy`), and per-source serialization comes from the
//! controller's work queue. Every step is a no-op when the store already matches,
//! so a repeated or interrupted pass is always safe to run again.

use super::phase::{PhaseEvent, PhaseStateMachine, RefreshRecord};
use super::resync::ResyncPolicy;
use super::secret::{SecretSynthesizer, SyncError, SyncOutcome};
use crate::crd::{Phase, RegistryCredentialsStatus};
use crate::observability::metrics;
use crate::provider::{ProviderError, ProviderRegistry};
use crate::store::{SourceId, SourceStore, StoreError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of a pass that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The source no longer exists; nothing was done
    NotFound,
    /// The source is being deleted; `entered` is true on the pass that moved it there
    Terminating { entered: bool },
    /// A fresh credential is in the pull secret
    Synced {
        sync: SyncOutcome,
        registry_host: String,
        expires_at: Option<DateTime<Utc>>,
        /// When the next pass should run
        requeue_after: Duration,
    },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Unknown kind or malformed spec; retrying cannot help until the spec changes
    #[error("invalid configuration for {source_id}: {message}")]
    Configuration { source_id: SourceId, message: String },

    #[error("{kind} provider failed for {source_id}: {error}")]
    Provider {
        source_id: SourceId,
        kind: String,
        #[source]
        error: ProviderError,
    },

    /// Reading or writing cluster state failed, including optimistic concurrency conflicts
    #[error("store operation failed for {source_id}: {error}")]
    Store {
        source_id: SourceId,
        #[source]
        error: StoreError,
    },
}

impl ReconcileError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::Configuration { .. })
    }

    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            ReconcileError::Configuration { .. } => "configuration",
            ReconcileError::Provider { .. } => "provider",
            ReconcileError::Store { .. } => "store",
        }
    }

    #[must_use]
    pub fn source_id(&self) -> &SourceId {
        match self {
            ReconcileError::Configuration { source_id, .. }
            | ReconcileError::Provider { source_id, .. }
            | ReconcileError::Store { source_id, .. } => source_id,
        }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn SourceStore>,
    providers: Arc<ProviderRegistry>,
    resync: ResyncPolicy,
}

impl fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("providers", &self.providers)
            .field("resync", &self.resync)
            .finish_non_exhaustive()
    }
}

/// True when the recorded credential is no longer valid at `now`
fn credential_expired(status: &RegistryCredentialsStatus, now: DateTime<Utc>) -> bool {
    status
        .expires_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|expires_at| expires_at.with_timezone(&Utc) <= now)
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn SourceStore>,
        providers: Arc<ProviderRegistry>,
        resync: ResyncPolicy,
    ) -> Self {
        Self {
            store,
            providers,
            resync,
        }
    }

    /// Run one pass for `id`
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error kinds are documented on ReconcileError"
    )]
    pub async fn reconcile(&self, id: &SourceId) -> Result<ReconcileOutcome, ReconcileError> {
        let span = info_span!(
            "reconcile",
            resource.namespace = %id.namespace,
            resource.name = %id.name
        );

        async move {
            let start = Instant::now();
            metrics::increment_reconciliations();

            let result = self.run(id).await;

            metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics::increment_reconciliation_errors(e.kind_label());
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, id: &SourceId) -> Result<ReconcileOutcome, ReconcileError> {
        let store = self.store.as_ref();
        let store_err = |error: StoreError| ReconcileError::Store {
            source_id: id.clone(),
            error,
        };

        let Some(mut source) = store.get_source(id).await.map_err(store_err)? else {
            debug!("Source not found, assuming it was deleted");
            return Ok(ReconcileOutcome::NotFound);
        };
        let machine = PhaseStateMachine::new(store);

        if source.deletion_requested {
            let entered = !source.status.phase.is_some_and(Phase::is_terminal);
            machine
                .advance(&mut source, PhaseEvent::DeletionRequested)
                .await
                .map_err(store_err)?;
            if entered {
                info!("Source is being deleted, credential refresh stopped");
            }
            return Ok(ReconcileOutcome::Terminating { entered });
        }
        if source.status.phase.is_some_and(Phase::is_terminal) {
            return Ok(ReconcileOutcome::Terminating { entered: false });
        }

        // Resolved before any write so an unsupported kind leaves the source untouched
        let Some(provider) = self.providers.resolve(&source.kind) else {
            return Err(ReconcileError::Configuration {
                source_id: id.clone(),
                message: format!(
                    "unsupported kind {:?} (supported: {})",
                    source.kind,
                    self.providers.kinds().join(", ")
                ),
            });
        };

        // A malformed section is reported before the phase is first written
        provider
            .validate(&source)
            .map_err(|error| ReconcileError::Configuration {
                source_id: id.clone(),
                message: error.to_string(),
            })?;

        if source.status.phase.is_none() {
            machine
                .advance(&mut source, PhaseEvent::Observed)
                .await
                .map_err(store_err)?;
        } else if source.status.phase == Some(Phase::Active)
            && credential_expired(&source.status, Utc::now())
        {
            info!(kind = %source.kind, "Credential expired, refetching");
            machine
                .advance(&mut source, PhaseEvent::CredentialExpired)
                .await
                .map_err(store_err)?;
        }

        let credential = match provider.fetch(&source).await {
            Ok(credential) => {
                metrics::record_provider_fetch(provider.kind(), "success");
                credential
            }
            Err(error) => {
                metrics::record_provider_fetch(provider.kind(), error.label());
                if error.is_configuration() {
                    return Err(ReconcileError::Configuration {
                        source_id: id.clone(),
                        message: error.to_string(),
                    });
                }
                warn!(
                    kind = %source.kind,
                    error = %error,
                    "Credential fetch failed, phase left unchanged"
                );
                return Err(ReconcileError::Provider {
                    source_id: id.clone(),
                    kind: source.kind.clone(),
                    error,
                });
            }
        };

        let sync = SecretSynthesizer::new(store)
            .sync(&credential)
            .await
            .map_err(|error| match error {
                SyncError::Store(error) => store_err(error),
                foreign @ SyncError::ForeignOwner { .. } => ReconcileError::Configuration {
                    source_id: id.clone(),
                    message: foreign.to_string(),
                },
            })?;
        metrics::record_secret_sync(sync.as_str());

        let refreshed_at = Utc::now();
        let requeue_after = self.resync.next_refresh(refreshed_at, credential.expires_at);
        let next_refresh_at = refreshed_at
            + chrono::Duration::from_std(requeue_after)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let observed_generation = source.generation;

        machine
            .advance(
                &mut source,
                PhaseEvent::Synced(RefreshRecord {
                    registry_host: credential.registry_host.clone(),
                    expires_at: credential.expires_at,
                    refreshed_at,
                    next_refresh_at,
                    observed_generation,
                }),
            )
            .await
            .map_err(store_err)?;

        debug!(
            kind = %source.kind,
            sync = sync.as_str(),
            requeue_after_secs = requeue_after.as_secs(),
            "Credential refreshed"
        );
        Ok(ReconcileOutcome::Synced {
            sync,
            registry_host: credential.registry_host.clone(),
            expires_at: credential.expires_at,
            requeue_after,
        })
    }
}
