//! # Basic Auth Provider
//!
//! Static Docker Hub login. The token is `base64("username:password")` and never expires.

use super::{decode_section, CredentialProvider, ProviderError, RegistryCredential};
use crate::crd::{BasicAuthSpec, BASIC_AUTH_KIND};
use crate::store::CredentialSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use tracing::debug;
use zeroize::Zeroizing;

/// Registry key Docker clients use for Docker Hub
pub const DOCKER_HUB_HOST: &str = "https://index.docker.io/v1/";

/// `base64("username:password")`, the `auth` value docker clients expect
#[must_use]
pub fn encode_basic_auth(username: &str, password: &str) -> Zeroizing<String> {
    let plain = Zeroizing::new(format!("{username}:{password}"));
    Zeroizing::new(STANDARD.encode(plain.as_bytes()))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicAuthProvider;

fn basic_auth_spec(source: &CredentialSource) -> Result<BasicAuthSpec, ProviderError> {
    let spec: BasicAuthSpec = decode_section(source, BASIC_AUTH_KIND, "basicAuth")?;
    if spec.username.is_empty() || spec.password.is_empty() {
        return Err(ProviderError::invalid_spec(
            BASIC_AUTH_KIND,
            "spec.basicAuth.username and spec.basicAuth.password must be non-empty",
        ));
    }
    Ok(spec)
}

#[async_trait]
impl CredentialProvider for BasicAuthProvider {
    fn kind(&self) -> &'static str {
        BASIC_AUTH_KIND
    }

    fn validate(&self, source: &CredentialSource) -> Result<(), ProviderError> {
        basic_auth_spec(source).map(|_| ())
    }

    async fn fetch(&self, source: &CredentialSource) -> Result<RegistryCredential, ProviderError> {
        let spec = basic_auth_spec(source)?;

        debug!(source = %source.id, username = %spec.username, "Encoding basic auth credential");
        RegistryCredential::new(
            source,
            "EncodeBasicAuth",
            DOCKER_HUB_HOST.to_string(),
            encode_basic_auth(&spec.username, &spec.password),
            None,
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::source;

    #[tokio::test]
    async fn test_fetch_encodes_username_and_password() {
        let src = source(
            "dockerhub",
            serde_json::json!({
                "kind": "BasicAuth",
                "basicAuth": { "username": "alice", "password": "s3cret" }
            }),
        );
        let cred = BasicAuthProvider.fetch(&src).await.unwrap();
        assert_eq!(cred.registry_host, DOCKER_HUB_HOST);
        assert_eq!(cred.auth_token.as_str(), "YWxpY2U6czNjcmV0");
        assert!(cred.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_fetch_is_deterministic() {
        let src = source(
            "dockerhub",
            serde_json::json!({
                "kind": "BasicAuth",
                "basicAuth": { "username": "alice", "password": "s3cret" }
            }),
        );
        let first = BasicAuthProvider.fetch(&src).await.unwrap();
        let second = BasicAuthProvider.fetch(&src).await.unwrap();
        assert_eq!(first.auth_token, second.auth_token);
    }

    #[tokio::test]
    async fn test_empty_password_is_invalid_spec() {
        let src = source(
            "dockerhub",
            serde_json::json!({
                "kind": "BasicAuth",
                "basicAuth": { "username": "alice", "password": "" }
            }),
        );
        let err = BasicAuthProvider.fetch(&src).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_missing_section_is_invalid_spec() {
        let src = source("dockerhub", serde_json::json!({ "kind": "BasicAuth" }));
        assert!(matches!(
            BasicAuthProvider.fetch(&src).await,
            Err(ProviderError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_validate_matches_fetch_rules() {
        let ok = source(
            "dockerhub",
            serde_json::json!({
                "kind": "BasicAuth",
                "basicAuth": { "username": "alice", "password": "s3cret" }
            }),
        );
        assert!(BasicAuthProvider.validate(&ok).is_ok());

        let missing = source("dockerhub", serde_json::json!({ "kind": "BasicAuth" }));
        assert!(BasicAuthProvider.validate(&missing).unwrap_err().is_configuration());
    }

    #[test]
    fn test_password_with_colon_is_kept_verbatim() {
        // "bob:pa:ss" -> Ym9iOnBhOnNz
        assert_eq!(encode_basic_auth("bob", "pa:ss").as_str(), "Ym9iOnBhOnNz");
    }
}
