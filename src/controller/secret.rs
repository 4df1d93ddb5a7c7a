//! # Secret Synthesis
//!
//! Renders a registry credential as a docker config document and converges the
//! derived pull secret onto it.

use crate::provider::RegistryCredential;
use crate::store::{DerivedSecret, SecretId, SourceStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `{"auths": {host: {"auth": token}}}`
///
/// Hosts are kept sorted so identical credentials always serialize to identical bytes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: BTreeMap<String, DockerAuth>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerAuth {
    pub auth: String,
}

impl fmt::Debug for DockerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerConfig")
            .field("hosts", &self.auths.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Debug for DockerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerAuth").field("auth", &"***").finish()
    }
}

impl DockerConfig {
    /// Config with exactly one entry, for the credential's host
    #[must_use]
    pub fn for_credential(credential: &RegistryCredential) -> Self {
        let mut auths = BTreeMap::new();
        auths.insert(
            credential.registry_host.clone(),
            DockerAuth {
                auth: credential.auth_token.to_string(),
            },
        );
        Self { auths }
    }

    /// Compact JSON bytes, as stored under `.dockerconfigjson`
    #[allow(
        clippy::missing_errors_doc,
        reason = "Serialization of string maps does not fail in practice"
    )]
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    #[allow(
        clippy::missing_errors_doc,
        reason = "Returns the serde_json error for malformed documents"
    )]
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// What a sync did to the derived secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SyncOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }

    /// True when the secret was written
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, SyncOutcome::Unchanged)
    }
}

/// Why a pull secret could not be converged
#[derive(Debug, Error)]
pub enum SyncError {
    /// A secret with the same name is controlled by another object
    #[error("secret {secret} is controlled by {owner_kind} {owner_name}")]
    ForeignOwner {
        secret: SecretId,
        owner_kind: String,
        owner_name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates or overwrites the pull secret derived from a credential
///
/// The secret's previous payload is replaced wholesale, so a host that changed
/// (new account, new region) never leaves a stale entry behind.
pub struct SecretSynthesizer<'a> {
    store: &'a dyn SourceStore,
}

impl fmt::Debug for SecretSynthesizer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSynthesizer").finish_non_exhaustive()
    }
}

impl<'a> SecretSynthesizer<'a> {
    #[must_use]
    pub fn new(store: &'a dyn SourceStore) -> Self {
        Self { store }
    }

    /// Converge the derived secret onto `credential`
    ///
    /// An existing secret of the same name is adopted unless another object
    /// controls it. One with a different `type` is recreated, since the type of
    /// a secret cannot change in place. A create that loses a race against
    /// another writer falls back to converging the secret that won.
    #[allow(
        clippy::missing_errors_doc,
        reason = "ForeignOwner for secrets controlled elsewhere, store errors unchanged"
    )]
    pub async fn sync(&self, credential: &RegistryCredential) -> Result<SyncOutcome, SyncError> {
        let id = SecretId::for_source(&credential.source_id);
        let desired = DerivedSecret::desired(
            id.clone(),
            DockerConfig::for_credential(credential),
            credential.owner.clone(),
        );

        if let Some(existing) = self.store.get_secret(&id).await? {
            return self.converge(existing, desired, credential).await;
        }

        match self.store.create_secret(&desired).await {
            Ok(()) => {
                info!(secret = %id, registry = %credential.registry_host, "Created pull secret");
                Ok(SyncOutcome::Created)
            }
            Err(e) if e.is_conflict() => {
                debug!(secret = %id, "Pull secret appeared concurrently, converging it");
                let current = self
                    .store
                    .get_secret(&id)
                    .await?
                    .ok_or(StoreError::NotFound {
                        resource: format!("secret {id}"),
                    })?;
                self.converge(current, desired, credential).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn converge(
        &self,
        current: DerivedSecret,
        desired: DerivedSecret,
        credential: &RegistryCredential,
    ) -> Result<SyncOutcome, SyncError> {
        if current.controlled_by_other(&credential.owner) {
            let owner = current.owner.unwrap_or_default();
            warn!(
                secret = %current.id,
                owner_kind = %owner.kind,
                owner_name = %owner.name,
                "Pull secret is controlled by another object, not adopting it"
            );
            return Err(SyncError::ForeignOwner {
                secret: current.id,
                owner_kind: owner.kind,
                owner_name: owner.name,
            });
        }

        if !current.is_docker_config() {
            info!(
                secret = %current.id,
                secret_type = current.secret_type.as_deref().unwrap_or_default(),
                "Recreating secret with the docker config type"
            );
            self.store.delete_secret(&current).await?;
            self.store.create_secret(&desired).await?;
            return Ok(SyncOutcome::Updated);
        }

        if current.matches(&desired.payload, &credential.owner) {
            debug!(secret = %current.id, "Pull secret already up to date");
            return Ok(SyncOutcome::Unchanged);
        }

        let desired = DerivedSecret {
            resource_version: current.resource_version,
            ..desired
        };
        self.store.replace_secret(&desired).await?;
        info!(secret = %desired.id, registry = %credential.registry_host, "Updated pull secret");
        Ok(SyncOutcome::Updated)
    }
}
