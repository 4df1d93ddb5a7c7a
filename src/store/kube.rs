//! # Kubernetes Store
//!
//! [`SourceStore`] backed by the API server: `RegistryCredentials` for sources and
//! `kubernetes.io/dockerconfigjson` secrets for derived secrets.

use super::{CredentialSource, DerivedSecret, SecretId, SourceId, SourceStore, StoreError};
use crate::constants::{
    CONTROLLER_NAME, DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_TYPE, MANAGED_BY_LABEL,
};
use crate::controller::DockerConfig;
use crate::crd::{RegistryCredentials, RegistryCredentialsStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams, Preconditions};
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn sources(&self, namespace: &str) -> Api<RegistryCredentials> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Convert a watched resource into the engine's view of it
pub fn to_credential_source(obj: &RegistryCredentials) -> Result<CredentialSource, StoreError> {
    let id = SourceId::new(obj.namespace().unwrap_or_default(), obj.name_any());
    let owner = obj
        .controller_owner_ref(&())
        .ok_or_else(|| StoreError::Malformed {
            resource: id.to_string(),
            message: "resource has no name or uid".to_string(),
        })?;

    Ok(CredentialSource {
        kind: obj.spec.kind.clone(),
        spec: serde_json::to_value(&obj.spec)?,
        status: obj.status.clone().unwrap_or_default(),
        deletion_requested: obj.metadata.deletion_timestamp.is_some(),
        generation: obj.metadata.generation,
        owner,
        resource_version: obj.resource_version(),
        id,
    })
}

fn to_derived_secret(secret: &Secret, id: &SecretId) -> DerivedSecret {
    let payload = secret
        .data
        .as_ref()
        .and_then(|data| data.get(DOCKER_CONFIG_JSON_KEY))
        .map_or_else(DockerConfig::default, |bytes| {
            // An unreadable payload is treated as empty so the next sync overwrites it
            DockerConfig::from_json(&bytes.0).unwrap_or_else(|e| {
                warn!(
                    secret = %id,
                    error = %e,
                    "Existing secret payload is not valid docker config JSON"
                );
                DockerConfig::default()
            })
        });

    let owner = secret
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)).cloned());

    DerivedSecret {
        id: id.clone(),
        payload,
        secret_type: secret.type_.clone(),
        owner,
        resource_version: secret.metadata.resource_version.clone(),
    }
}

fn to_kube_secret(secret: &DerivedSecret) -> Result<Secret, StoreError> {
    let mut data = BTreeMap::new();
    data.insert(
        DOCKER_CONFIG_JSON_KEY.to_string(),
        ByteString(secret.payload.to_json()?),
    );

    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string());

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(secret.id.name.clone()),
            namespace: Some(secret.id.namespace.clone()),
            labels: Some(labels),
            owner_references: secret.owner.clone().map(|o| vec![o]),
            resource_version: secret.resource_version.clone(),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    })
}

fn map_write_error(err: kube::Error, resource: String) -> StoreError {
    match err {
        kube::Error::Api(e) if e.code == 409 => StoreError::Conflict {
            resource,
            message: e.message,
        },
        kube::Error::Api(e) if e.code == 404 => StoreError::NotFound { resource },
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl SourceStore for KubeStore {
    async fn get_source(&self, id: &SourceId) -> Result<Option<CredentialSource>, StoreError> {
        match self.sources(&id.namespace).get_opt(&id.name).await? {
            Some(obj) => to_credential_source(&obj).map(Some),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        source: &mut CredentialSource,
        status: RegistryCredentialsStatus,
    ) -> Result<(), StoreError> {
        // Every field is spelled out so cleared values become nulls in the merge patch
        let mut patch = serde_json::json!({
            "status": {
                "phase": status.phase,
                "registryHost": status.registry_host,
                "expiresAt": status.expires_at,
                "lastRefreshTime": status.last_refresh_time,
                "nextRefreshTime": status.next_refresh_time,
                "observedGeneration": status.observed_generation,
            }
        });
        if let Some(rv) = &source.resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
        }

        let updated = self
            .sources(&source.id.namespace)
            .patch_status(
                &source.id.name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| map_write_error(e, source.id.to_string()))?;

        debug!(source = %source.id, phase = ?status.phase, "Status updated");
        source.resource_version = updated.resource_version();
        source.status = status;
        Ok(())
    }

    async fn get_secret(&self, id: &SecretId) -> Result<Option<DerivedSecret>, StoreError> {
        Ok(self
            .secrets(&id.namespace)
            .get_opt(&id.name)
            .await?
            .map(|secret| to_derived_secret(&secret, id)))
    }

    async fn create_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        let mut obj = to_kube_secret(secret)?;
        obj.metadata.resource_version = None;
        self.secrets(&secret.id.namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| map_write_error(e, format!("secret {}", secret.id)))?;
        Ok(())
    }

    async fn replace_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        let obj = to_kube_secret(secret)?;
        self.secrets(&secret.id.namespace)
            .replace(&secret.id.name, &PostParams::default(), &obj)
            .await
            .map_err(|e| map_write_error(e, format!("secret {}", secret.id)))?;
        Ok(())
    }

    async fn delete_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                resource_version: secret.resource_version.clone(),
                uid: None,
            }),
            ..Default::default()
        };
        self.secrets(&secret.id.namespace)
            .delete(&secret.id.name, &params)
            .await
            .map_err(|e| map_write_error(e, format!("secret {}", secret.id)))?;
        debug!(secret = %secret.id, "Secret deleted");
        Ok(())
    }
}
