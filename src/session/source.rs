use aws_config::environment::credentials::EnvironmentVariableCredentialsProvider;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::Credentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider, future};
use aws_runtime::env_config::file::EnvConfigFiles;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::debug;

/// A static credential source consulted before any role negotiation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    /// `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and optional `AWS_SESSION_TOKEN`
    Environment,
    /// The profile's keys in the shared credentials file only
    /// (`AWS_SHARED_CREDENTIALS_FILE` or `~/.aws/credentials`)
    SharedCredentialsFile,
}

impl CredentialSource {
    /// Priority order used when no explicit order is configured
    pub const DEFAULT_ORDER: [CredentialSource; 2] = [
        CredentialSource::Environment,
        CredentialSource::SharedCredentialsFile,
    ];

    pub(crate) fn provider(self, profile: Option<&str>) -> SharedCredentialsProvider {
        match self {
            CredentialSource::Environment => {
                SharedCredentialsProvider::new(EnvironmentVariableCredentialsProvider::new())
            }
            CredentialSource::SharedCredentialsFile => {
                let files = EnvConfigFiles::builder()
                    .include_default_credentials_file(true)
                    .build();
                let mut builder = ProfileFileCredentialsProvider::builder().profile_files(files);
                if let Some(profile) = profile {
                    builder = builder.profile_name(profile);
                }
                SharedCredentialsProvider::new(builder.build())
            }
        }
    }

    /// Ask this source for credentials
    pub async fn probe(self, profile: Option<&str>) -> Result<Credentials, CredentialsError> {
        let result = self.provider(profile).provide_credentials().await;
        debug!(source = ?self, ok = result.is_ok(), "probed credential source");
        result
    }
}

/// Credentials this close to expiry are refreshed before being handed out
pub const REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Lazily fetched credentials, reused until they are about to expire
///
/// Concurrent callers share one in-flight fetch. Credentials within
/// [`REFRESH_BUFFER`] of their expiry are fetched again. Credentials without
/// an expiry are kept for the lifetime of the session.
#[derive(Clone)]
pub struct CachedCredentials {
    provider: SharedCredentialsProvider,
    cached: Arc<Mutex<Option<Credentials>>>,
}

impl fmt::Debug for CachedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCredentials")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl CachedCredentials {
    /// Cache in front of `provider`; nothing is fetched until first use
    pub fn new(provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(provider),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Cache already holding `credentials`, falling back to `provider` once they expire
    pub fn seeded(provider: SharedCredentialsProvider, credentials: Credentials) -> Self {
        Self {
            provider,
            cached: Arc::new(Mutex::new(Some(credentials))),
        }
    }

    /// Return the cached credentials, fetching them first if absent or about to expire
    pub async fn get(&self) -> Result<Credentials, CredentialsError> {
        let mut cached = self.cached.lock().await;

        if let Some(credentials) = cached.as_ref().filter(|c| !is_expired(c)) {
            return Ok(credentials.clone());
        }

        let credentials = self.provider.provide_credentials().await?;
        debug!(expiry = ?credentials.expiry(), "fetched credentials");
        *cached = Some(credentials.clone());
        Ok(credentials)
    }
}

fn is_expired(credentials: &Credentials) -> bool {
    credentials
        .expiry()
        .is_some_and(|expiry| expiry <= SystemTime::now() + REFRESH_BUFFER)
}

impl ProvideCredentials for CachedCredentials {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
        lifetime: Option<Duration>,
    }

    impl ProvideCredentials for Counting {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let expiry = self.lifetime.map(|d| SystemTime::now() + d);
            future::ProvideCredentials::ready(Ok(Credentials::new(
                format!("key-{call}"),
                "secret",
                None,
                expiry,
                "test",
            )))
        }
    }

    #[tokio::test]
    async fn test_fetches_once_without_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachedCredentials::new(Counting {
            calls: Arc::clone(&calls),
            lifetime: None,
        });

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(first.access_key_id(), "key-0");
        assert_eq!(second.access_key_id(), "key-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_after_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachedCredentials::new(Counting {
            calls: Arc::clone(&calls),
            lifetime: Some(Duration::ZERO),
        });

        let _ = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert_eq!(second.access_key_id(), "key-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refreshes_credentials_close_to_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SharedCredentialsProvider::new(Counting {
            calls: Arc::clone(&calls),
            lifetime: Some(Duration::from_secs(3600)),
        });
        let expiring = SystemTime::now() + Duration::from_millis(500);
        let seed = Credentials::new("stale", "secret", None, Some(expiring), "test");
        let cache = CachedCredentials::seeded(provider, seed);

        let served = cache.get().await.unwrap();
        assert_eq!(served.access_key_id(), "key-0");
        assert_eq!(cache.get().await.unwrap().access_key_id(), "key-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keeps_credentials_outside_refresh_buffer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SharedCredentialsProvider::new(Counting {
            calls: Arc::clone(&calls),
            lifetime: None,
        });
        let expiry = SystemTime::now() + REFRESH_BUFFER + Duration::from_secs(60);
        let seed = Credentials::new("seed", "secret", None, Some(expiry), "test");
        let cache = CachedCredentials::seeded(provider, seed);

        assert_eq!(cache.get().await.unwrap().access_key_id(), "seed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_seeded_cache_skips_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SharedCredentialsProvider::new(Counting {
            calls: Arc::clone(&calls),
            lifetime: None,
        });
        let seed = Credentials::new("seed", "secret", None, None, "test");
        let cache = CachedCredentials::seeded(provider, seed);

        assert_eq!(cache.get().await.unwrap().access_key_id(), "seed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
