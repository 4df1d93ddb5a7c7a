//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use registry_credentials_controller::prelude::*;
//! ```

pub use crate::crd::*;

pub use crate::provider::{CredentialProvider, ProviderError, ProviderRegistry, RegistryCredential};

pub use crate::controller::{
    DockerConfig, ReconcileError, ReconcileOutcome, ReconciliationEngine, SyncOutcome,
};

pub use crate::store::{SourceId, SourceStore, StoreError};

pub use crate::config::ControllerConfig;
