//! Authenticated AWS session resolution
//!
//! Static credentials are preferred: each [`CredentialSource`] is consulted in
//! order and the first one that yields credentials is used as is. When none
//! does, credentials come from the profile's assume-role configuration
//! (prompting for an MFA code if the profile names an `mfa_serial`), and
//! finally from the SDK's default chain for that profile.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), flow::Error> {
//! let session = flow::session::Session::builder()
//!     .profile("admin")
//!     .region("eu-west-1")
//!     .build()
//!     .await?;
//! let client = session.dynamodb_client();
//! # Ok(())
//! # }
//! ```

mod assume_role;
mod mfa;
mod source;

pub use assume_role::{AssumeRoleRequest, RoleAssumer, StsRoleAssumer};
pub use mfa::{MfaTokenProvider, StdinTokenProvider};
pub use source::{CachedCredentials, CredentialSource, REFRESH_BUFFER};

use aws_config::meta::credentials::CredentialsProviderChain;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::Error;
use assume_role::AssumeRoleProvider;

/// Profile name that routes all requests to a local LocalStack instance
pub const LOCALSTACK_PROFILE: &str = "localstack";

/// Endpoint used for the [`LOCALSTACK_PROFILE`] when none is given
pub const LOCALSTACK_ENDPOINT: &str = "http://127.0.0.1:4566";

/// Which path produced the session's credentials
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedBy {
    /// A static credential source
    Source(CredentialSource),
    /// The profile's assume-role configuration or the SDK default chain
    Fallback,
}

/// Region, endpoint and cached credentials for one CLI invocation
#[derive(Clone, Debug)]
pub struct Session {
    config: SdkConfig,
    credentials: CachedCredentials,
    resolved_by: ResolvedBy,
}

impl Session {
    /// Start configuring a session
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Resolve a session for `profile` with default options
    pub async fn from_profile(profile: &str) -> Result<Self, Error> {
        Self::builder().profile(profile).build().await
    }

    /// Region requests are sent to
    pub fn region(&self) -> Option<&Region> {
        self.config.region()
    }

    /// Endpoint override, if any
    pub fn endpoint_url(&self) -> Option<&str> {
        self.config.endpoint_url()
    }

    /// SDK configuration carrying the session's credentials
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Which path resolved the credentials
    pub fn resolved_by(&self) -> ResolvedBy {
        self.resolved_by
    }

    /// Current credentials, fetched on first use and reused until they expire
    pub async fn credentials(&self) -> Result<Credentials, Error> {
        Ok(self.credentials.get().await?)
    }

    /// DynamoDB client for this session
    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(&self.config)
    }
}

/// Options for resolving a [`Session`]
pub struct SessionBuilder {
    profile: Option<String>,
    region: Option<String>,
    endpoint_url: Option<String>,
    sources: Vec<CredentialSource>,
    token_provider: Arc<dyn MfaTokenProvider>,
    role_assumer: Option<Arc<dyn RoleAssumer>>,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("profile", &self.profile)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Defaults: `AWS_PROFILE` or `default`, environment then credentials file,
    /// MFA codes read from stdin, roles assumed through STS
    pub fn new() -> Self {
        Self {
            profile: None,
            region: None,
            endpoint_url: None,
            sources: CredentialSource::DEFAULT_ORDER.to_vec(),
            token_provider: Arc::new(StdinTokenProvider),
            role_assumer: None,
        }
    }

    /// Named profile; an empty name keeps the default
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into()).filter(|p| !p.is_empty());
        self
    }

    /// Region override
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into()).filter(|r| !r.is_empty());
        self
    }

    /// Endpoint override for every service client
    pub fn endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into()).filter(|u| !u.is_empty());
        self
    }

    /// Static credential sources, consulted in the given order
    pub fn sources(mut self, sources: Vec<CredentialSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Where MFA token codes come from
    pub fn token_provider(mut self, provider: impl MfaTokenProvider + 'static) -> Self {
        self.token_provider = Arc::new(provider);
        self
    }

    /// How roles are assumed; defaults to [`StsRoleAssumer`]
    pub fn role_assumer(mut self, assumer: impl RoleAssumer + 'static) -> Self {
        self.role_assumer = Some(Arc::new(assumer));
        self
    }

    /// Resolve the session
    ///
    /// Static sources are probed immediately. Fallback credentials are only
    /// fetched on first use, so a failing fallback surfaces from
    /// [`Session::credentials`] rather than here.
    pub async fn build(self) -> Result<Session, Error> {
        let profile = self.profile.as_deref();
        let selected = profile
            .map(str::to_string)
            .or_else(|| std::env::var("AWS_PROFILE").ok());
        let endpoint_url = self.endpoint_url.clone().or_else(|| {
            (selected.as_deref() == Some(LOCALSTACK_PROFILE)).then(|| LOCALSTACK_ENDPOINT.to_string())
        });

        let (credentials, resolved_by) = match self.resolve_static().await {
            Some((credentials, source)) => (credentials, ResolvedBy::Source(source)),
            None => (self.fallback().await, ResolvedBy::Fallback),
        };
        info!(
            profile = selected.as_deref().unwrap_or("default"),
            resolved_by = ?resolved_by,
            "session resolved"
        );

        let timeout_config = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(3))
            .read_timeout(Duration::from_secs(20))
            .operation_timeout(Duration::from_secs(60))
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(
                RetryConfig::standard()
                    .with_max_attempts(3)
                    .with_initial_backoff(Duration::from_secs(1)),
            )
            .timeout_config(timeout_config)
            .credentials_provider(credentials.clone());

        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        Ok(Session {
            config: loader.load().await,
            credentials,
            resolved_by,
        })
    }

    async fn resolve_static(&self) -> Option<(CachedCredentials, CredentialSource)> {
        let profile = self.profile.as_deref();

        for &source in &self.sources {
            match source.probe(profile).await {
                Ok(credentials) => {
                    let cached = CachedCredentials::seeded(source.provider(profile), credentials);
                    return Some((cached, source));
                }
                Err(e) => debug!(source = ?source, error = %e, "credential source unavailable"),
            }
        }

        None
    }

    async fn fallback(&self) -> CachedCredentials {
        let assumer = self.role_assumer.clone().unwrap_or_else(|| {
            Arc::new(StsRoleAssumer::new(self.endpoint_url.clone()))
        });
        let assume_role = AssumeRoleProvider::new(
            self.profile.clone(),
            Arc::clone(&self.token_provider),
            assumer,
        );

        let mut default_chain = DefaultCredentialsChain::builder();
        if let Some(profile) = &self.profile {
            default_chain = default_chain.profile_name(profile);
        }
        if let Some(region) = &self.region {
            default_chain = default_chain.region(Region::new(region.clone()));
        }

        CachedCredentials::new(
            CredentialsProviderChain::first_try("AssumeRoleMfa", assume_role)
                .or_else("Default", default_chain.build().await),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::new();
        assert_eq!(builder.profile, None);
        assert_eq!(builder.sources, CredentialSource::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn test_empty_profile_keeps_default() {
        let builder = SessionBuilder::new().profile("").region("").endpoint_url("");
        assert_eq!(builder.profile, None);
        assert_eq!(builder.region, None);
        assert_eq!(builder.endpoint_url, None);
    }
}
