//! # Source Store
//!
//! Storage seam between the reconciliation engine and the Kubernetes API.
//!
//! The engine only sees [`CredentialSource`] and [`DerivedSecret`] values and the
//! [`SourceStore`] trait, so it can run against the API server ([`KubeStore`]) or an
//! in-memory store in tests.

mod kube;
#[cfg(test)]
pub(crate) mod memory;

pub use self::kube::KubeStore;

use crate::constants::DOCKER_CONFIG_JSON_TYPE;
use crate::controller::DockerConfig;
use crate::crd::RegistryCredentialsStatus;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::fmt;
use thiserror::Error;

/// Namespace/name of a credential source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub namespace: String,
    pub name: String,
}

impl SourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Namespace/name of a derived pull secret
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId {
    pub namespace: String,
    pub name: String,
}

impl SecretId {
    /// The derived secret shares the source's namespace and name
    #[must_use]
    pub fn for_source(source: &SourceId) -> Self {
        Self {
            namespace: source.namespace.clone(),
            name: source.name.clone(),
        }
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A credential source as the engine sees it
///
/// `spec` is kept as raw JSON so providers decode only the section they own,
/// and an unsupported `kind` never fails before provider resolution.
#[derive(Clone)]
pub struct CredentialSource {
    pub id: SourceId,
    pub kind: String,
    pub spec: serde_json::Value,
    pub status: RegistryCredentialsStatus,
    pub deletion_requested: bool,
    pub generation: Option<i64>,
    /// Controller owner reference pointing back at this source
    pub owner: OwnerReference,
    pub resource_version: Option<String>,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // spec carries access keys and passwords
        f.debug_struct("CredentialSource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("spec", &"<redacted>")
            .field("status", &self.status)
            .field("deletion_requested", &self.deletion_requested)
            .field("generation", &self.generation)
            .field("resource_version", &self.resource_version)
            .finish_non_exhaustive()
    }
}

/// A `kubernetes.io/dockerconfigjson` secret derived from a source
#[derive(Debug, Clone)]
pub struct DerivedSecret {
    pub id: SecretId,
    pub payload: DockerConfig,
    /// Secret `type`; immutable once the secret exists
    pub secret_type: Option<String>,
    /// Controller owner reference, if any
    pub owner: Option<OwnerReference>,
    pub resource_version: Option<String>,
}

impl DerivedSecret {
    /// A pull secret owned by `owner`, not yet written
    #[must_use]
    pub fn desired(id: SecretId, payload: DockerConfig, owner: OwnerReference) -> Self {
        Self {
            id,
            payload,
            secret_type: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
            owner: Some(owner),
            resource_version: None,
        }
    }

    #[must_use]
    pub fn is_docker_config(&self) -> bool {
        self.secret_type.as_deref() == Some(DOCKER_CONFIG_JSON_TYPE)
    }

    /// True when another object is the secret's controller
    #[must_use]
    pub fn controlled_by_other(&self, owner: &OwnerReference) -> bool {
        self.owner.as_ref().is_some_and(|o| o.uid != owner.uid)
    }

    /// True when payload and controller owner already match the desired state
    #[must_use]
    pub fn matches(&self, payload: &DockerConfig, owner: &OwnerReference) -> bool {
        self.payload == *payload && self.owner.as_ref().is_some_and(|o| o.uid == owner.uid)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("malformed {resource}: {message}")]
    Malformed { resource: String, message: String },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::Conflict { .. } => "conflict",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Malformed { .. } => "malformed",
            StoreError::Kube(_) => "kube",
            StoreError::Serialization(_) => "serialization",
        }
    }
}

/// Read/write access to credential sources and their derived secrets
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Load a source; `Ok(None)` when it no longer exists
    async fn get_source(&self, id: &SourceId) -> Result<Option<CredentialSource>, StoreError>;

    /// Persist `status` on the source and refresh its resource version
    ///
    /// Fails with [`StoreError::Conflict`] when the source changed since it was read.
    async fn update_status(
        &self,
        source: &mut CredentialSource,
        status: RegistryCredentialsStatus,
    ) -> Result<(), StoreError>;

    async fn get_secret(&self, id: &SecretId) -> Result<Option<DerivedSecret>, StoreError>;

    /// Create a secret; [`StoreError::Conflict`] when one with the same name exists
    async fn create_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError>;

    /// Replace an existing secret, guarded by `secret.resource_version` when set
    async fn replace_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError>;

    /// Delete a secret, guarded by `secret.resource_version` when set
    async fn delete_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError>;
}
