//! In-memory [`SourceStore`] used by engine tests.

use super::{CredentialSource, DerivedSecret, SecretId, SourceId, SourceStore, StoreError};
use crate::crd::RegistryCredentialsStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    sources: Mutex<HashMap<SourceId, CredentialSource>>,
    secrets: Mutex<HashMap<SecretId, DerivedSecret>>,
    writes: Mutex<Vec<String>>,
    version: AtomicU64,
    race_next_create: AtomicBool,
}

impl MemoryStore {
    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, write: String) {
        self.writes.lock().unwrap().push(write);
    }

    pub(crate) fn insert_source(&self, mut source: CredentialSource) {
        source.resource_version = Some(self.next_version());
        self.sources
            .lock()
            .unwrap()
            .insert(source.id.clone(), source);
    }

    pub(crate) fn insert_secret(&self, mut secret: DerivedSecret) {
        secret.resource_version = Some(self.next_version());
        self.secrets
            .lock()
            .unwrap()
            .insert(secret.id.clone(), secret);
    }

    pub(crate) fn source(&self, id: &SourceId) -> Option<CredentialSource> {
        self.sources.lock().unwrap().get(id).cloned()
    }

    pub(crate) fn secret(&self, id: &SecretId) -> Option<DerivedSecret> {
        self.secrets.lock().unwrap().get(id).cloned()
    }

    pub(crate) fn secret_count(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub(crate) fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Simulate a user edit; bumps the resource version like the API server would
    pub(crate) fn edit_source(&self, id: &SourceId, edit: impl FnOnce(&mut CredentialSource)) {
        let version = self.next_version();
        if let Some(source) = self.sources.lock().unwrap().get_mut(id) {
            edit(source);
            source.resource_version = Some(version);
        }
    }

    /// Make the next create lose a race against a concurrent writer
    pub(crate) fn race_next_create(&self) {
        self.race_next_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn get_source(&self, id: &SourceId) -> Result<Option<CredentialSource>, StoreError> {
        Ok(self.source(id))
    }

    async fn update_status(
        &self,
        source: &mut CredentialSource,
        status: RegistryCredentialsStatus,
    ) -> Result<(), StoreError> {
        let version = self.next_version();
        {
            let mut sources = self.sources.lock().unwrap();
            let stored = sources
                .get_mut(&source.id)
                .ok_or_else(|| StoreError::NotFound {
                    resource: source.id.to_string(),
                })?;
            if stored.resource_version != source.resource_version {
                return Err(StoreError::Conflict {
                    resource: source.id.to_string(),
                    message: "resource version changed".to_string(),
                });
            }
            stored.status = status.clone();
            stored.resource_version = Some(version.clone());
        }
        self.record(format!("status {}", source.id));
        source.status = status;
        source.resource_version = Some(version);
        Ok(())
    }

    async fn get_secret(&self, id: &SecretId) -> Result<Option<DerivedSecret>, StoreError> {
        Ok(self.secret(id))
    }

    async fn create_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        if self.race_next_create.swap(false, Ordering::SeqCst) {
            self.insert_secret(DerivedSecret {
                owner: None,
                payload: crate::controller::DockerConfig::default(),
                ..secret.clone()
            });
        }
        let version = self.next_version();
        {
            let mut secrets = self.secrets.lock().unwrap();
            if secrets.contains_key(&secret.id) {
                return Err(StoreError::Conflict {
                    resource: format!("secret {}", secret.id),
                    message: "already exists".to_string(),
                });
            }
            let mut stored = secret.clone();
            stored.resource_version = Some(version);
            secrets.insert(secret.id.clone(), stored);
        }
        self.record(format!("create {}", secret.id));
        Ok(())
    }

    async fn replace_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        let version = self.next_version();
        {
            let mut secrets = self.secrets.lock().unwrap();
            let stored = secrets
                .get_mut(&secret.id)
                .ok_or_else(|| StoreError::NotFound {
                    resource: format!("secret {}", secret.id),
                })?;
            if secret.resource_version.is_some()
                && secret.resource_version != stored.resource_version
            {
                return Err(StoreError::Conflict {
                    resource: format!("secret {}", secret.id),
                    message: "resource version changed".to_string(),
                });
            }
            if secret.secret_type != stored.secret_type {
                // The API server rejects type changes as invalid
                return Err(StoreError::Kube(kube::Error::Api(
                    kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "field is immutable".to_string(),
                        reason: "Invalid".to_string(),
                        code: 422,
                    },
                )));
            }
            *stored = secret.clone();
            stored.resource_version = Some(version);
        }
        self.record(format!("replace {}", secret.id));
        Ok(())
    }

    async fn delete_secret(&self, secret: &DerivedSecret) -> Result<(), StoreError> {
        {
            let mut secrets = self.secrets.lock().unwrap();
            let stored = secrets
                .get(&secret.id)
                .ok_or_else(|| StoreError::NotFound {
                    resource: format!("secret {}", secret.id),
                })?;
            if secret.resource_version.is_some()
                && secret.resource_version != stored.resource_version
            {
                return Err(StoreError::Conflict {
                    resource: format!("secret {}", secret.id),
                    message: "resource version changed".to_string(),
                });
            }
            secrets.remove(&secret.id);
        }
        self.record(format!("delete {}", secret.id));
        Ok(())
    }
}
