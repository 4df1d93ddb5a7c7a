//! Registry Credentials Controller Library
//!
//! Keeps `kubernetes.io/dockerconfigjson` pull secrets filled with fresh registry
//! credentials declared by `RegistryCredentials` resources.
//! Tests are included in the module files.
//!
//! ## Quick Start
//!
//! ```rust
//! use registry_credentials_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;
pub mod store;
