//! # Provider Registry
//!
//! Maps a source kind to the provider that serves it. Built once at startup and
//! shared read-only across reconciliations.

use super::{AssumedRoleEcrProvider, BasicAuthProvider, CredentialProvider, SdkEcrApi};
use crate::config::ControllerConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn CredentialProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registry with every built-in provider
    #[must_use]
    pub fn with_default_providers(config: &ControllerConfig) -> Self {
        let ecr_api = SdkEcrApi::new(
            config.ecr_endpoint_url.clone(),
            config.sts_endpoint_url.clone(),
        );
        Self::builder()
            .register(Arc::new(BasicAuthProvider))
            .register(Arc::new(AssumedRoleEcrProvider::new(Arc::new(ecr_api))))
            .build()
    }

    /// Provider for `kind`; lookup is exact and case-sensitive
    #[must_use]
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn CredentialProvider>> {
        self.providers.get(kind).cloned()
    }

    /// Registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<&'static str, Arc<dyn CredentialProvider>>,
}

impl fmt::Debug for ProviderRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistryBuilder").finish_non_exhaustive()
    }
}

impl ProviderRegistryBuilder {
    /// Register a provider under its own kind; a later registration for the same kind wins
    #[must_use]
    pub fn register(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}
