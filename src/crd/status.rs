//! # RegistryCredentials Status
//!
//! Status types for tracking the lifecycle phase and the last credential refresh.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a `RegistryCredentials` resource
///
/// `Terminating` is terminal: once entered, no further credentials are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum Phase {
    Provisioning,
    Active,
    Terminating,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Provisioning => "Provisioning",
            Phase::Active => "Active",
            Phase::Terminating => "Terminating",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Terminating)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the RegistryCredentials resource
///
/// Only `phase` drives behaviour; the remaining fields are written together with the
/// `Active` transition and carried over unchanged by every other transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentialsStatus {
    /// Current phase: Provisioning, Active or Terminating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Registry host of the last synced credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_host: Option<String>,
    /// Expiry of the last synced credential (RFC3339), absent for non-expiring credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Time of the last successful refresh (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<String>,
    /// Time the next refresh is scheduled for (RFC3339)
    /// Persists the refresh schedule across controller restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_refresh_time: Option<String>,
    /// Generation observed by the last successful refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
