//! # Registry Credentials Controller
//!
//! A Kubernetes controller that keeps container registry pull secrets filled with
//! fresh credentials.
//!
//! ## Overview
//!
//! For every `RegistryCredentials` resource the controller:
//!
//! 1. **Fetches a credential** - Docker Hub basic auth, or an Amazon ECR authorization
//!    token obtained with static IAM access keys
//! 2. **Writes a pull secret** - A `kubernetes.io/dockerconfigjson` secret with the same
//!    name, owned by the resource so it is garbage collected with it
//! 3. **Refreshes it** - Hourly, or shortly before the credential expires
//!
//! Phase (`Provisioning`, `Active`, `Terminating`) is reported in the resource status.

use anyhow::Result;
use registry_credentials_controller::config::ControllerConfig;
use registry_credentials_controller::runtime::{
    init_logging, initialize, install_crypto_provider, run_watch_loop,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    install_crypto_provider();

    let config = Arc::new(ControllerConfig::from_env());
    init_logging(&config)?;

    let init = initialize(config).await?;
    run_watch_loop(init.api, init.context, init.server_state).await
}
