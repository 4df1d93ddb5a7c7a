//! # RegistryCredentials Spec
//!
//! Declared intent to keep a registry pull secret filled with fresh credentials.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source kind served by the basic-auth provider (Docker Hub)
pub const BASIC_AUTH_KIND: &str = "BasicAuth";

/// Source kind served by the ECR provider (static IAM keys, STS-resolved account)
pub const ASSUMED_ROLE_ECR_KIND: &str = "AssumedRoleECR";

/// RegistryCredentials Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: registry.octopilot.io/v1alpha1
/// kind: RegistryCredentials
/// metadata:
///   name: ecr-pull
///   namespace: apps
/// spec:
///   kind: AssumedRoleECR
///   assumedRoleEcr:
///     accessKeyId: AKIA...
///     secretAccessKey: ...
///     region: us-east-1
/// ```
///
/// The controller writes a `kubernetes.io/dockerconfigjson` secret named after
/// the resource, in the same namespace, owned by it.
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "RegistryCredentials",
    group = "registry.octopilot.io",
    version = "v1alpha1",
    plural = "registrycredentials",
    namespaced,
    status = "crate::crd::RegistryCredentialsStatus",
    shortname = "regcred",
    printcolumn = r#"{"name":"Kind", "type":"string", "jsonPath":".spec.kind"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Expires", "type":"string", "jsonPath":".status.expiresAt"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentialsSpec {
    /// Credential source kind: `BasicAuth` or `AssumedRoleECR`
    /// Unsupported values are reported on the resource and not retried until the spec changes
    pub kind: String,
    /// Docker Hub username/password, read when `kind` is `BasicAuth`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthSpec>,
    /// IAM access keys and region, read when `kind` is `AssumedRoleECR`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_role_ecr: Option<AssumedRoleEcrSpec>,
}

/// Static registry login
#[derive(Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthSpec {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthSpec")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// IAM access key pair used to obtain an ECR authorization token
#[derive(Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssumedRoleEcrSpec {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// AWS region of the registry (e.g., "us-east-1")
    pub region: String,
}

impl fmt::Debug for AssumedRoleEcrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumedRoleEcrSpec")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}
