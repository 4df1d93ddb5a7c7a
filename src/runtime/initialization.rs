//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, HTTP server, Kubernetes
//! client and the shared reconciliation context.

use crate::config::ControllerConfig;
use crate::constants::CONTROLLER_NAME;
use crate::controller::{ReconciliationEngine, ResyncPolicy};
use crate::crd::RegistryCredentials;
use crate::observability::metrics;
use crate::provider::ProviderRegistry;
use crate::runtime::context::ControllerContext;
use crate::runtime::events::KubeEventPublisher;
use crate::server::{start_server, ServerState};
use crate::store::KubeStore;
use anyhow::{anyhow, Context, Result};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub api: Api<RegistryCredentials>,
    pub context: Arc<ControllerContext>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Install ring as the rustls crypto provider
///
/// Must run before any TLS connection (Kubernetes API, AWS endpoints) is opened.
pub fn install_crypto_provider() {
    // Err means a provider is already installed, which is fine
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Default filter when `RUST_LOG` is unset
fn default_filter(config: &ControllerConfig) -> String {
    format!("registry_credentials_controller={}", config.log_level)
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails when a global subscriber is already installed"
)]
pub fn init_logging(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let result = if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {e}"))
}

/// Initialize the controller runtime
///
/// Logging must already be set up (see [`init_logging`]).
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails when metrics cannot be registered or no Kubernetes client can be built"
)]
pub async fn initialize(config: Arc<ControllerConfig>) -> Result<InitializationResult> {
    info!("Starting Registry Credentials Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let providers = Arc::new(ProviderRegistry::with_default_providers(&config));
    info!(kinds = ?providers.kinds(), "Registered credential providers");

    let engine = ReconciliationEngine::new(
        Arc::new(KubeStore::new(client.clone())),
        providers,
        ResyncPolicy {
            period: config.resync_period(),
            refresh_margin: config.refresh_margin(),
            min_interval: config.min_refresh_interval(),
        },
    );
    let events = Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));

    let api: Api<RegistryCredentials> = match &config.watch_namespace {
        Some(namespace) => {
            info!(namespace = %namespace, "Watching RegistryCredentials in a single namespace");
            Api::namespaced(client, namespace)
        }
        None => {
            info!("Watching RegistryCredentials in all namespaces");
            Api::all(client)
        }
    };

    let context = Arc::new(ControllerContext::new(engine, events, config));
    server_state.set_ready(true);

    Ok(InitializationResult {
        api,
        context,
        server_state,
    })
}
