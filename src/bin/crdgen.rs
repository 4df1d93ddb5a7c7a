//! # CRD Generator
//!
//! Prints the `RegistryCredentials` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/registrycredentials.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::CustomResourceExt;
use registry_credentials_controller::crd::RegistryCredentials;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&RegistryCredentials::crd())?);
    Ok(())
}
