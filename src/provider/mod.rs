//! # Credential Providers
//!
//! A provider turns the kind-specific section of a credential source into a registry
//! credential: a registry host, an auth token for that host and an optional expiry.
//!
//! - [`BasicAuthProvider`] - static Docker Hub username/password
//! - [`AssumedRoleEcrProvider`] - Amazon ECR authorization token from static IAM keys
//!
//! Providers are looked up by kind through the [`ProviderRegistry`].

use crate::store::{CredentialSource, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

mod basic_auth;
mod ecr;
mod registry;

pub use basic_auth::{encode_basic_auth, BasicAuthProvider, DOCKER_HUB_HOST};
pub use ecr::{
    ecr_registry_host, AssumedRoleEcrProvider, AuthorizationGrant, EcrApi, EcrSession, SdkEcrApi,
};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};

#[cfg(test)]
pub(crate) use ecr::MockEcrApi;

/// Provider trait for registry credential sources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Source kind this provider serves (matches `spec.kind`)
    fn kind(&self) -> &'static str;

    /// Check the kind-specific section of `source` without any remote call
    ///
    /// Runs before the source is touched, so a malformed spec leaves no status behind.
    fn validate(&self, source: &CredentialSource) -> Result<(), ProviderError>;

    /// Fetch a fresh credential for `source`
    ///
    /// Never returns a partially-populated credential: any failure is an error.
    async fn fetch(&self, source: &CredentialSource) -> Result<RegistryCredential, ProviderError>;
}

/// A credential ready to be written into a pull secret
#[derive(Clone)]
pub struct RegistryCredential {
    pub source_id: SourceId,
    pub registry_host: String,
    /// Opaque token placed verbatim in the `auth` field of the docker config
    pub auth_token: Zeroizing<String>,
    /// `None` for credentials that never expire
    pub expires_at: Option<DateTime<Utc>>,
    pub owner: OwnerReference,
}

impl RegistryCredential {
    /// Build a credential, rejecting empty hosts, empty tokens and expiries that
    /// are not after `fetched_at`
    #[allow(
        clippy::missing_errors_doc,
        reason = "Errors are ProviderError::InvalidResponse for each rejected field"
    )]
    pub fn new(
        source: &CredentialSource,
        operation: &'static str,
        registry_host: String,
        auth_token: Zeroizing<String>,
        expires_at: Option<DateTime<Utc>>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, ProviderError> {
        if registry_host.is_empty() {
            return Err(ProviderError::invalid_response(
                operation,
                "registry host is empty",
            ));
        }
        if auth_token.is_empty() {
            return Err(ProviderError::invalid_response(
                operation,
                "authorization token is empty",
            ));
        }
        if let Some(expires_at) = expires_at {
            if expires_at <= fetched_at {
                return Err(ProviderError::invalid_response(
                    operation,
                    format!("credential already expired at {}", expires_at.to_rfc3339()),
                ));
            }
        }

        Ok(Self {
            source_id: source.id.clone(),
            registry_host,
            auth_token,
            expires_at,
            owner: source.owner.clone(),
        })
    }
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("source_id", &self.source_id)
            .field("registry_host", &self.registry_host)
            .field("auth_token", &"***")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The source's kind-specific section is missing or incomplete
    #[error("invalid {kind} spec: {message}")]
    InvalidSpec { kind: &'static str, message: String },

    /// The remote service rejected the request
    #[error("{operation} failed with {code}: {message}")]
    Service {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// The request never got a service answer (network, timeout, credential resolution)
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The service answered without a usable credential
    #[error("{operation} returned an unusable response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn invalid_spec(kind: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }

    /// Configuration errors need a spec change before a retry can succeed
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidSpec { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } => "invalid_spec",
            Self::Service { .. } => "service",
            Self::Transport { .. } => "transport",
            Self::InvalidResponse { .. } => "invalid_response",
        }
    }
}

/// Decode the `key` section of a source spec (e.g. `basicAuth`)
pub(crate) fn decode_section<T: DeserializeOwned>(
    source: &CredentialSource,
    kind: &'static str,
    key: &str,
) -> Result<T, ProviderError> {
    let section = source
        .spec
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ProviderError::invalid_spec(kind, format!("spec.{key} is required")))?;
    serde_json::from_value(section.clone())
        .map_err(|e| ProviderError::invalid_spec(kind, format!("spec.{key}: {e}")))
}
