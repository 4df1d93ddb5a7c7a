//! # Custom Resource Definitions
//!
//! CRD types for the Registry Credentials Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `RegistryCredentials` resource and the per-kind spec sections
//! - `status.rs` - Lifecycle phase and refresh bookkeeping

mod spec;
mod status;

pub use spec::{
    AssumedRoleEcrSpec, BasicAuthSpec, RegistryCredentials, RegistryCredentialsSpec,
    ASSUMED_ROLE_ECR_KIND, BASIC_AUTH_KIND,
};
pub use status::{Phase, RegistryCredentialsStatus};
