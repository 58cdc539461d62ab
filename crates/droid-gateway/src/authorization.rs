//! Authorization façade
//!
//! `AuthorizationProvider` is the one context object the process builds at
//! startup and hands to its request handlers. Initialization resolves the
//! credential source, builds the matching provider, optionally warms it up
//! and starts the pool's background refresh. Per request, handlers only ask
//! for the outbound `Authorization` value.

use std::sync::Arc;

use droid_auth::{Account, FixedClientId, TokenFile, TokenRefresher, UuidV7ClientId};
use droid_pool::{AccountPool, spawn_refresh_task};
use provider::{ClientSuppliedProvider, Provider, ProviderHealth};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::provider_impl::{FixedKeyProvider, PoolProvider, RefreshTokenProvider};
use crate::resolver::{
    AccountSpec, CredentialSource, CredentialSourceResolver, Resolution, ResolveInputs,
};

/// Label of the single account outside pool mode.
const SINGLETON_LABEL: &str = "default";

/// Cheap to clone; clones share the same credential state.
#[derive(Clone)]
pub struct AuthorizationProvider {
    inner: Arc<Inner>,
}

struct Inner {
    source: CredentialSource,
    provider: Arc<dyn Provider>,
    refresh_task: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

/// Provider plus the pool handle the background task needs.
struct Built {
    provider: Arc<dyn Provider>,
    pool: Option<Arc<AccountPool>>,
}

impl AuthorizationProvider {
    /// Resolve the credential source from the environment and build the
    /// provider. Must run inside a tokio runtime.
    pub async fn initialize(config: &Config) -> Result<Self> {
        config.validate()?;
        let inputs = ResolveInputs::from_env(config);
        Self::from_inputs(config, &inputs).await
    }

    /// Same as [`initialize`](Self::initialize) with explicit resolution inputs.
    ///
    /// With `refresh.warm_up` set, tokens are fetched before returning. A
    /// pool tolerates failing accounts; a single refresh token that cannot
    /// be exchanged fails initialization.
    pub async fn from_inputs(config: &Config, inputs: &ResolveInputs) -> Result<Self> {
        let resolution = CredentialSourceResolver::default().resolve(inputs);
        let source = resolution.source();
        let built = build(config, resolution);

        if config.refresh.warm_up {
            built.provider.warm_up().await?;
        }

        let refresh_task = match (&built.pool, config.background_refresh_interval()) {
            (Some(pool), Some(interval)) => {
                info!(interval_secs = interval.as_secs(), "starting background token refresh");
                Some(spawn_refresh_task(pool.clone(), interval))
            }
            _ => None,
        };

        info!(source = %source, provider = built.provider.id(), "authorization initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                source,
                provider: built.provider,
                refresh_task,
            }),
        })
    }

    /// Build from an already resolved source, without warm-up or background
    /// refresh.
    pub fn from_resolution(config: &Config, resolution: Resolution) -> Self {
        let source = resolution.source();
        let built = build(config, resolution);
        Self {
            inner: Arc::new(Inner {
                source,
                provider: built.provider,
                refresh_task: None,
            }),
        }
    }

    pub fn source(&self) -> CredentialSource {
        self.inner.source
    }

    pub fn has_refresh_task(&self) -> bool {
        self.inner.refresh_task.is_some()
    }

    /// Fetch tokens now instead of on the first request.
    pub async fn warm_up(&self) -> Result<()> {
        Ok(self.inner.provider.warm_up().await?)
    }

    /// Outbound `Authorization` header value for one request.
    ///
    /// `client_authorization` is the inbound request's own header; it is
    /// only used when no credential source is configured.
    pub async fn authorization(&self, client_authorization: Option<&str>) -> Result<String> {
        match self.inner.provider.authorization(client_authorization).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(source = %self.inner.source, error = %e, "no outbound authorization");
                Err(e.into())
            }
        }
    }

    pub async fn health(&self) -> ProviderHealth {
        self.inner.provider.health().await
    }
}

fn refresher(config: &Config) -> TokenRefresher {
    let client = reqwest::Client::new();
    let endpoint = config.identity.token_endpoint.as_str();
    let refresher = match config.identity.client_id.as_deref() {
        Some(id) => TokenRefresher::new(client, endpoint, &FixedClientId(id.trim().to_string())),
        None => TokenRefresher::new(client, endpoint, &UuidV7ClientId),
    };
    refresher.with_timeout(config.refresh_timeout())
}

fn build(config: &Config, resolution: Resolution) -> Built {
    let stale_after = config.stale_after();
    match resolution {
        Resolution::FixedKey(key) => Built {
            provider: Arc::new(FixedKeyProvider::new(key)),
            pool: None,
        },
        Resolution::Pool { path, accounts } => {
            info!(path = %path.display(), accounts = accounts.len(), "loading account pool");
            let accounts = accounts
                .into_iter()
                .map(|spec| match spec {
                    AccountSpec::FixedKey { label, key } => {
                        Account::fixed_key(label, key.expose().as_str())
                    }
                    AccountSpec::Refresh {
                        label,
                        refresh_token,
                    } => Account::refreshable(label, refresh_token.expose().as_str())
                        .with_stale_after(stale_after),
                })
                .collect();
            let pool = Arc::new(AccountPool::new(accounts, refresher(config)));
            Built {
                provider: Arc::new(PoolProvider::new(pool.clone())),
                pool: Some(pool),
            }
        }
        Resolution::RefreshTokenEnv {
            refresh_token,
            persist_path,
        } => {
            let account = Account::refreshable(SINGLETON_LABEL, refresh_token.expose().as_str())
                .with_stale_after(stale_after)
                .with_persistence(TokenFile::new(persist_path));
            Built {
                provider: Arc::new(RefreshTokenProvider::new(
                    CredentialSource::RefreshTokenEnv.label(),
                    account,
                    refresher(config),
                )),
                pool: None,
            }
        }
        Resolution::RefreshTokenFile {
            refresh_token,
            access_token,
            last_updated,
            path,
        } => {
            let mut account = Account::refreshable(SINGLETON_LABEL, refresh_token.expose().as_str())
                .with_stale_after(stale_after)
                .with_persistence(TokenFile::new(path));
            if let Some(access_token) = access_token {
                account = account.with_access_token(access_token.expose().as_str(), last_updated);
            }
            Built {
                provider: Arc::new(RefreshTokenProvider::new(
                    CredentialSource::RefreshTokenFile.label(),
                    account,
                    refresher(config),
                )),
                pool: None,
            }
        }
        Resolution::ClientSupplied => Built {
            provider: Arc::new(ClientSuppliedProvider::new()),
            pool: None,
        },
    }
}
