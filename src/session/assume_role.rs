use aws_config::environment::credentials::EnvironmentVariableCredentialsProvider;
use aws_config::profile::{Profile, ProfileFileCredentialsProvider};
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider, future};
use aws_runtime::env_config::file::EnvConfigFiles;
use aws_sdk_sts::operation::assume_role::AssumeRoleOutput;
use aws_types::os_shim_internal::{Env, Fs};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::Error;
use crate::session::mfa::MfaTokenProvider;

/// Everything needed to call STS AssumeRole for one profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// ARN of the role to assume
    pub role_arn: String,
    /// Profile whose static keys sign the AssumeRole call
    pub source_profile: Option<String>,
    /// Name recorded for the role session
    pub session_name: String,
    /// External id required by the role's trust policy
    pub external_id: Option<String>,
    /// Requested session lifetime
    pub duration_seconds: Option<i32>,
    /// Serial number (or ARN) of the MFA device
    pub mfa_serial: Option<String>,
    /// Code obtained from the [`MfaTokenProvider`]
    pub token_code: Option<String>,
    /// Region of the STS endpoint
    pub region: Option<String>,
}

impl AssumeRoleRequest {
    fn from_profile(profile: &Profile, role_arn: &str) -> Result<Self, CredentialsError> {
        let duration_seconds = profile
            .get("duration_seconds")
            .map(|value| {
                value.trim().parse::<i32>().map_err(|e| {
                    CredentialsError::invalid_configuration(format!(
                        "invalid duration_seconds '{value}': {e}"
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            role_arn: role_arn.to_string(),
            source_profile: profile.get("source_profile").map(str::to_string),
            session_name: profile
                .get("role_session_name")
                .map(str::to_string)
                .unwrap_or_else(default_session_name),
            external_id: profile.get("external_id").map(str::to_string),
            duration_seconds,
            mfa_serial: profile.get("mfa_serial").map(str::to_string),
            token_code: None,
            region: profile.get("region").map(str::to_string),
        })
    }
}

fn default_session_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("flow-{now}")
}

/// Exchanges an [`AssumeRoleRequest`] for temporary credentials
pub trait RoleAssumer: Send + Sync + fmt::Debug {
    /// Perform the role assumption
    fn assume_role(&self, request: AssumeRoleRequest) -> BoxFuture<'_, Result<Credentials, Error>>;
}

/// [`RoleAssumer`] calling STS AssumeRole
#[derive(Clone, Debug, Default)]
pub struct StsRoleAssumer {
    endpoint_url: Option<String>,
}

impl StsRoleAssumer {
    /// Call STS at its regional endpoint, or at `endpoint_url` when set
    pub fn new(endpoint_url: Option<String>) -> Self {
        Self { endpoint_url }
    }
}

impl RoleAssumer for StsRoleAssumer {
    fn assume_role(&self, request: AssumeRoleRequest) -> BoxFuture<'_, Result<Credentials, Error>> {
        async move {
            let source = match &request.source_profile {
                Some(profile) => SharedCredentialsProvider::new(
                    ProfileFileCredentialsProvider::builder()
                        .profile_name(profile)
                        .build(),
                ),
                None => SharedCredentialsProvider::new(EnvironmentVariableCredentialsProvider::new()),
            };

            let mut loader = aws_config::defaults(BehaviorVersion::latest()).credentials_provider(source);
            if let Some(region) = &request.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint_url) = &self.endpoint_url {
                loader = loader.endpoint_url(endpoint_url);
            }
            let client = aws_sdk_sts::Client::new(&loader.load().await);

            let output = client
                .assume_role()
                .role_arn(&request.role_arn)
                .role_session_name(&request.session_name)
                .set_external_id(request.external_id.clone())
                .set_duration_seconds(request.duration_seconds)
                .set_serial_number(request.mfa_serial.clone())
                .set_token_code(request.token_code.clone())
                .send()
                .await?;

            temporary_credentials(output)
        }
        .boxed()
    }
}

fn temporary_credentials(output: AssumeRoleOutput) -> Result<Credentials, Error> {
    let credentials = output.credentials.ok_or_else(|| {
        Error::Credentials(CredentialsError::provider_error(
            "AssumeRole returned no credentials",
        ))
    })?;

    Ok(Credentials::new(
        credentials.access_key_id,
        credentials.secret_access_key,
        Some(credentials.session_token),
        SystemTime::try_from(credentials.expiration).ok(),
        "AssumeRoleProvider",
    ))
}

/// Credentials from the profile's `role_arn`, prompting for MFA when `mfa_serial` is set
///
/// Reads both shared config files. Profiles without `role_arn` yield a
/// "not loaded" error so a provider chain can move on.
pub(crate) struct AssumeRoleProvider {
    profile: Option<String>,
    token_provider: Arc<dyn MfaTokenProvider>,
    assumer: Arc<dyn RoleAssumer>,
}

impl fmt::Debug for AssumeRoleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleProvider")
            .field("profile", &self.profile)
            .field("assumer", &self.assumer)
            .finish_non_exhaustive()
    }
}

impl AssumeRoleProvider {
    pub(crate) fn new(
        profile: Option<String>,
        token_provider: Arc<dyn MfaTokenProvider>,
        assumer: Arc<dyn RoleAssumer>,
    ) -> Self {
        Self {
            profile,
            token_provider,
            assumer,
        }
    }

    async fn request(&self) -> Result<AssumeRoleRequest, CredentialsError> {
        let profiles = aws_config::profile::load(
            &Fs::real(),
            &Env::real(),
            &EnvConfigFiles::default(),
            self.profile.clone().map(Cow::Owned),
        )
        .await
        .map_err(CredentialsError::invalid_configuration)?;

        let name = profiles.selected_profile();
        let profile = profiles
            .get_profile(name)
            .ok_or_else(|| CredentialsError::not_loaded(format!("profile '{name}' not found")))?;
        let role_arn = profile
            .get("role_arn")
            .ok_or_else(|| CredentialsError::not_loaded(format!("profile '{name}' has no role_arn")))?;

        AssumeRoleRequest::from_profile(profile, role_arn)
    }

    async fn assume(&self) -> Result<Credentials, CredentialsError> {
        let mut request = self.request().await?;

        if let Some(mfa_serial) = request.mfa_serial.clone() {
            let token_provider = Arc::clone(&self.token_provider);
            let code = tokio::task::spawn_blocking(move || token_provider.token_code(&mfa_serial))
                .await
                .map_err(CredentialsError::provider_error)?
                .map_err(CredentialsError::provider_error)?;
            request.token_code = Some(code.trim().to_string());
        }

        info!(
            role_arn = %request.role_arn,
            source_profile = request.source_profile.as_deref().unwrap_or(""),
            mfa = request.mfa_serial.is_some(),
            "assuming role"
        );

        let credentials = self
            .assumer
            .assume_role(request)
            .await
            .map_err(CredentialsError::provider_error)?;
        debug!(expiry = ?credentials.expiry(), "role assumed");

        Ok(credentials)
    }
}

impl ProvideCredentials for AssumeRoleProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.assume())
    }
}
