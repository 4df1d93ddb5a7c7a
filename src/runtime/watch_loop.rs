//! # Watch Loop
//!
//! Runs the kube-runtime `Controller` over `RegistryCredentials`: the watch and
//! resync feed that drives the reconciliation engine.

use crate::constants::REFRESH_DUE_TOLERANCE_SECS;
use crate::controller::{ReconcileError, ReconcileOutcome};
use crate::crd::{Phase, RegistryCredentials};
use crate::observability::metrics;
use crate::runtime::context::ControllerContext;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::events::{actions, reasons};
use crate::server::ServerState;
use crate::store::SourceId;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Time left until the next scheduled refresh, when this event needs no work
///
/// Watch events caused by the controller's own status writes arrive with the
/// generation already observed and the next refresh still in the future; those
/// are answered with a requeue for the remaining time instead of a new pass.
#[must_use]
pub fn pending_refresh(obj: &RegistryCredentials, now: DateTime<Utc>) -> Option<Duration> {
    if obj.metadata.deletion_timestamp.is_some() {
        return None;
    }
    let status = obj.status.as_ref()?;
    if status.phase != Some(Phase::Active) {
        return None;
    }
    if obj.metadata.generation.is_none() || status.observed_generation != obj.metadata.generation {
        return None;
    }

    let next = DateTime::parse_from_rfc3339(status.next_refresh_time.as_deref()?)
        .ok()?
        .with_timezone(&Utc);
    if now >= next - chrono::Duration::seconds(REFRESH_DUE_TOLERANCE_SECS) {
        return None;
    }
    (next - now).to_std().ok()
}

async fn reconcile(
    obj: Arc<RegistryCredentials>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let id = SourceId::new(obj.namespace().unwrap_or_default(), obj.name_any());
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.watch.reconcile",
        resource.name = %id.name,
        resource.namespace = %id.namespace,
        resource.generation = obj.metadata.generation.unwrap_or(0)
    );

    async move {
        if let Some(remaining) = pending_refresh(&obj, Utc::now()) {
            debug!(
                requeue_after_secs = remaining.as_secs(),
                "Skipping reconciliation - no spec change and refresh not due"
            );
            return Ok(Action::requeue(remaining));
        }

        let key = id.to_string();
        let obj_ref = obj.object_ref(&());
        match ctx.engine.reconcile(&id).await {
            Ok(outcome) => {
                ctx.reset_backoff(&key);
                Ok(match outcome {
                    ReconcileOutcome::Synced {
                        sync,
                        registry_host,
                        requeue_after,
                        ..
                    } => {
                        if sync.changed() {
                            ctx.events
                                .publish(
                                    &obj_ref,
                                    EventType::Normal,
                                    reasons::CREDENTIALS_SYNCED,
                                    actions::REFRESH,
                                    Some(format!(
                                        "Pull secret {} for {registry_host}",
                                        sync.as_str()
                                    )),
                                )
                                .await;
                        }
                        metrics::increment_requeues_total("resync");
                        Action::requeue(requeue_after)
                    }
                    ReconcileOutcome::Terminating { entered } => {
                        if entered {
                            ctx.events
                                .publish(
                                    &obj_ref,
                                    EventType::Normal,
                                    reasons::TERMINATING,
                                    actions::RECONCILE,
                                    Some("Credential refresh stopped".to_string()),
                                )
                                .await;
                        }
                        Action::await_change()
                    }
                    ReconcileOutcome::NotFound => Action::await_change(),
                })
            }
            Err(error) => {
                if let ReconcileError::Configuration { message, .. } = &error {
                    ctx.events
                        .publish(
                            &obj_ref,
                            EventType::Warning,
                            reasons::CONFIGURATION_INVALID,
                            actions::RECONCILE,
                            Some(message.clone()),
                        )
                        .await;
                }
                Err(error)
            }
        }
    }
    .instrument(span)
    .await
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Run the controller until shutdown, restarting the watch whenever its stream ends
#[allow(
    clippy::missing_errors_doc,
    reason = "Stream errors are logged and the watch restarted; the loop itself does not fail"
)]
pub async fn run_watch_loop(
    api: Api<RegistryCredentials>,
    ctx: Arc<ControllerContext>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, marking controller not ready");
        shutdown_state.set_ready(false);
    });

    let restart_delay = ctx.config.watch_restart_delay();
    let controller_config =
        controller::Config::default().concurrency(ctx.config.max_concurrent_reconciliations);

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        info!("Starting controller watch loop...");
        Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .with_config(controller_config.clone())
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&ctx))
            .for_each(|result| async move {
                match result {
                    Ok((obj_ref, action)) => {
                        debug!(resource = %obj_ref, ?action, "watch.event.success");
                    }
                    // Already handled by the error policy
                    Err(controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(e) => {
                        handle_watch_stream_error(&format!("{e:?}"), restart_delay).await;
                    }
                }
            })
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{RegistryCredentialsSpec, RegistryCredentialsStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn active(generation: i64, observed: i64, next_refresh: DateTime<Utc>) -> RegistryCredentials {
        let mut obj = RegistryCredentials::new(
            "dockerhub",
            RegistryCredentialsSpec {
                kind: "BasicAuth".to_string(),
                basic_auth: None,
                assumed_role_ecr: None,
            },
        );
        obj.metadata.namespace = Some("apps".to_string());
        obj.metadata.generation = Some(generation);
        obj.status = Some(RegistryCredentialsStatus {
            phase: Some(Phase::Active),
            observed_generation: Some(observed),
            next_refresh_time: Some(next_refresh.to_rfc3339()),
            ..Default::default()
        });
        obj
    }

    #[test]
    fn test_own_status_write_is_skipped_until_refresh_due() {
        let now = Utc::now();
        let obj = active(1, 1, now + chrono::Duration::minutes(30));
        let remaining = pending_refresh(&obj, now).unwrap();
        assert!(remaining <= Duration::from_secs(30 * 60));
        assert!(remaining > Duration::from_secs(29 * 60));
    }

    #[test]
    fn test_due_refresh_runs() {
        let now = Utc::now();
        let obj = active(1, 1, now + chrono::Duration::seconds(1));
        assert_eq!(pending_refresh(&obj, now), None);
    }

    #[test]
    fn test_spec_change_runs() {
        let now = Utc::now();
        let obj = active(2, 1, now + chrono::Duration::minutes(30));
        assert_eq!(pending_refresh(&obj, now), None);
    }

    #[test]
    fn test_deletion_runs() {
        let now = Utc::now();
        let mut obj = active(1, 1, now + chrono::Duration::minutes(30));
        let deleted_at: Time =
            serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap();
        obj.metadata.deletion_timestamp = Some(deleted_at);
        assert_eq!(pending_refresh(&obj, now), None);
    }

    #[test]
    fn test_provisioning_runs() {
        let now = Utc::now();
        let mut obj = active(1, 1, now + chrono::Duration::minutes(30));
        if let Some(status) = obj.status.as_mut() {
            status.phase = Some(Phase::Provisioning);
        }
        assert_eq!(pending_refresh(&obj, now), None);
    }

    #[test]
    fn test_new_object_runs() {
        let mut obj = active(1, 1, Utc::now());
        obj.status = None;
        assert_eq!(pending_refresh(&obj, Utc::now()), None);
    }
}
