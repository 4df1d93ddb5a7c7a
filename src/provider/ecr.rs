//! # Amazon ECR Provider
//!
//! Exchanges a static IAM access key pair for an ECR authorization token.
//!
//! The registry host is `{account}.dkr.ecr.{region}.amazonaws.com`, where the account
//! is the one owning the access keys (STS `GetCallerIdentity`). The token returned by
//! `GetAuthorizationToken` is already `base64("AWS:password")` and is used verbatim.

use super::{decode_section, CredentialProvider, ProviderError, RegistryCredential};
use crate::crd::{AssumedRoleEcrSpec, ASSUMED_ROLE_ECR_KIND};
use crate::store::CredentialSource;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_ecr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info_span, warn, Instrument};
use zeroize::Zeroizing;

const GET_AUTHORIZATION_TOKEN: &str = "GetAuthorizationToken";
const GET_CALLER_IDENTITY: &str = "GetCallerIdentity";

/// Credentials and region for one ECR session
///
/// The SDK configuration is loaded on first use and shared by every call made
/// with the same session.
#[derive(Clone)]
pub struct EcrSession {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
    pub region: String,
    sdk_config: OnceCell<SdkConfig>,
}

impl EcrSession {
    #[must_use]
    pub fn new(
        access_key_id: String,
        secret_access_key: Zeroizing<String>,
        region: String,
    ) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            region,
            sdk_config: OnceCell::new(),
        }
    }
}

impl fmt::Debug for EcrSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcrSession")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}

/// An ECR authorization token and the moment it stops being accepted
#[derive(Clone)]
pub struct AuthorizationGrant {
    pub token: Zeroizing<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGrant")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Remote calls needed by the ECR provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EcrApi: Send + Sync {
    async fn get_authorization_token(
        &self,
        session: &EcrSession,
    ) -> Result<AuthorizationGrant, ProviderError>;

    /// Account ID owning the session's access keys
    async fn get_caller_account(&self, session: &EcrSession) -> Result<String, ProviderError>;
}

#[must_use]
pub fn ecr_registry_host(account: &str, region: &str) -> String {
    format!("{account}.dkr.ecr.{region}.amazonaws.com")
}

/// [`EcrApi`] backed by the AWS SDK
#[derive(Debug, Clone, Default)]
pub struct SdkEcrApi {
    ecr_endpoint: Option<String>,
    sts_endpoint: Option<String>,
}

impl SdkEcrApi {
    /// Endpoint overrides are meant for local AWS emulators
    #[must_use]
    pub fn new(ecr_endpoint: Option<String>, sts_endpoint: Option<String>) -> Self {
        Self {
            ecr_endpoint,
            sts_endpoint,
        }
    }

    async fn sdk_config(session: &EcrSession) -> &SdkConfig {
        session
            .sdk_config
            .get_or_init(|| async {
                let credentials = Credentials::new(
                    session.access_key_id.clone(),
                    session.secret_access_key.as_str(),
                    None,
                    None,
                    "registry-credentials-controller",
                );
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(session.region.clone()))
                    .credentials_provider(credentials)
                    .load()
                    .await
            })
            .await
    }
}

fn classify_sdk_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match err {
        SdkError::ServiceError(context) => ProviderError::Service {
            operation,
            code: context.err().code().unwrap_or("Unknown").to_string(),
            message: context.err().message().unwrap_or_default().to_string(),
        },
        _ => ProviderError::Transport {
            operation,
            message: DisplayErrorContext(err).to_string(),
        },
    }
}

#[async_trait]
impl EcrApi for SdkEcrApi {
    async fn get_authorization_token(
        &self,
        session: &EcrSession,
    ) -> Result<AuthorizationGrant, ProviderError> {
        let sdk_config = Self::sdk_config(session).await;
        let mut builder = aws_sdk_ecr::config::Builder::from(sdk_config);
        if let Some(url) = &self.ecr_endpoint {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_ecr::Client::from_conf(builder.build());

        let output = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| classify_sdk_error(GET_AUTHORIZATION_TOKEN, &e))?;

        let data = output.authorization_data().first().ok_or_else(|| {
            ProviderError::invalid_response(GET_AUTHORIZATION_TOKEN, "no authorization data")
        })?;
        let token = data
            .authorization_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProviderError::invalid_response(GET_AUTHORIZATION_TOKEN, "no authorization token")
            })?;
        let expires_at = data
            .expires_at()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
            .ok_or_else(|| {
                ProviderError::invalid_response(GET_AUTHORIZATION_TOKEN, "no token expiry")
            })?;

        Ok(AuthorizationGrant {
            token: Zeroizing::new(token.to_string()),
            expires_at,
        })
    }

    async fn get_caller_account(&self, session: &EcrSession) -> Result<String, ProviderError> {
        let sdk_config = Self::sdk_config(session).await;
        let mut builder = aws_sdk_sts::config::Builder::from(sdk_config);
        if let Some(url) = &self.sts_endpoint {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_sts::Client::from_conf(builder.build());

        let output = client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| classify_sdk_error(GET_CALLER_IDENTITY, &e))?;

        output
            .account()
            .filter(|a| !a.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| ProviderError::invalid_response(GET_CALLER_IDENTITY, "no account ID"))
    }
}

/// ECR provider keyed on static IAM access keys
pub struct AssumedRoleEcrProvider {
    api: Arc<dyn EcrApi>,
}

impl fmt::Debug for AssumedRoleEcrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumedRoleEcrProvider").finish_non_exhaustive()
    }
}

impl AssumedRoleEcrProvider {
    #[must_use]
    pub fn new(api: Arc<dyn EcrApi>) -> Self {
        Self { api }
    }
}

fn ecr_session(source: &CredentialSource) -> Result<EcrSession, ProviderError> {
    let spec: AssumedRoleEcrSpec = decode_section(source, ASSUMED_ROLE_ECR_KIND, "assumedRoleEcr")?;
    if spec.access_key_id.is_empty() || spec.secret_access_key.is_empty() || spec.region.is_empty()
    {
        return Err(ProviderError::invalid_spec(
            ASSUMED_ROLE_ECR_KIND,
            "spec.assumedRoleEcr requires accessKeyId, secretAccessKey and region",
        ));
    }
    Ok(EcrSession::new(
        spec.access_key_id,
        Zeroizing::new(spec.secret_access_key),
        spec.region,
    ))
}

#[async_trait]
impl CredentialProvider for AssumedRoleEcrProvider {
    fn kind(&self) -> &'static str {
        ASSUMED_ROLE_ECR_KIND
    }

    fn validate(&self, source: &CredentialSource) -> Result<(), ProviderError> {
        ecr_session(source).map(|_| ())
    }

    async fn fetch(&self, source: &CredentialSource) -> Result<RegistryCredential, ProviderError> {
        let session = ecr_session(source)?;
        let span = info_span!("ecr.fetch", source = %source.id, region = %session.region);

        async move {
            let grant = self.api.get_authorization_token(&session).await?;
            let account = self
                .api
                .get_caller_account(&session)
                .await
                .inspect_err(|e| {
                    warn!(error = %e, "Failed to resolve account for ECR registry host");
                })?;

            let host = ecr_registry_host(&account, &session.region);
            debug!(
                registry = %host,
                expires_at = %grant.expires_at,
                "Obtained ECR authorization token"
            );

            RegistryCredential::new(
                source,
                GET_AUTHORIZATION_TOKEN,
                host,
                grant.token,
                Some(grant.expires_at),
                Utc::now(),
            )
        }
        .instrument(span)
        .await
    }
}
