//! Provider implementations for the gateway-managed credential sources.
//!
//! The client-supplied mode lives in the `provider` crate; the three modes
//! here hold credentials of their own.

use common::Secret;
use droid_auth::{Account, TokenRefresher};
use droid_pool::AccountPool;
use provider::{Provider, ProviderError, ProviderHealth};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

fn auth_error(e: droid_auth::Error) -> ProviderError {
    ProviderError::Auth(e.to_string())
}

/// Static API key from the environment. Never refreshes.
pub struct FixedKeyProvider {
    key: Secret<String>,
}

impl FixedKeyProvider {
    pub fn new(key: Secret<String>) -> Self {
        Self { key }
    }
}

impl Provider for FixedKeyProvider {
    fn id(&self) -> &str {
        "fixed_key"
    }

    fn authorization<'a>(
        &'a self,
        _client_authorization: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = provider::Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(self.key.bearer()) })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>> {
        Box::pin(async { ProviderHealth::healthy() })
    }
}

/// Round-robin over a pool of accounts with per-request failover.
pub struct PoolProvider {
    pool: Arc<AccountPool>,
}

impl PoolProvider {
    pub fn new(pool: Arc<AccountPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }
}

impl Provider for PoolProvider {
    fn id(&self) -> &str {
        "pool"
    }

    fn authorization<'a>(
        &'a self,
        _client_authorization: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = provider::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.pool.get_token().await.map_err(|e| match e {
                droid_pool::Error::PoolExhausted(msg) => ProviderError::PoolExhausted(msg),
            })
        })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>> {
        Box::pin(async move {
            let detail = self.pool.health().await;
            let status = detail["status"].as_str().unwrap_or("unhealthy").to_string();
            ProviderHealth {
                status,
                detail: Some(detail),
            }
        })
    }

    /// Failures are logged per account and never fail the warm-up; a broken
    /// account is retried on later requests.
    fn warm_up(&self) -> Pin<Box<dyn Future<Output = provider::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.pool.warm_up().await;
            Ok(())
        })
    }
}

/// Single refreshable account whose rotated tokens are persisted to disk.
pub struct RefreshTokenProvider {
    id: &'static str,
    account: Arc<Account>,
    refresher: TokenRefresher,
}

impl RefreshTokenProvider {
    /// `id` names the source the refresh token came from.
    pub fn new(id: &'static str, account: Account, refresher: TokenRefresher) -> Self {
        Self {
            id,
            account: Arc::new(account),
            refresher,
        }
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }
}

impl Provider for RefreshTokenProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn authorization<'a>(
        &'a self,
        _client_authorization: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = provider::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let token = self
                .account
                .ensure_token(&self.refresher)
                .await
                .map_err(auth_error)?;
            debug!(account = self.account.label(), "using refreshed access token");
            Ok(format!("Bearer {token}"))
        })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>> {
        Box::pin(async move {
            let snapshot = self.account.snapshot().await;
            let status = if snapshot.has_token {
                "healthy"
            } else {
                "unhealthy"
            };
            ProviderHealth {
                status: status.to_string(),
                detail: serde_json::to_value(&snapshot).ok(),
            }
        })
    }

    /// Unlike the pool, a single account that cannot produce a token fails
    /// the warm-up.
    fn warm_up(&self) -> Pin<Box<dyn Future<Output = provider::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.account
                .ensure_token(&self.refresher)
                .await
                .map(|_| ())
                .map_err(auth_error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droid_auth::TokenFile;
    use droid_auth::testing::MockTokenEndpoint;

    #[tokio::test]
    async fn fixed_key_returns_bearer_and_ignores_client_header() {
        let provider = FixedKeyProvider::new(Secret::new("fk-123".to_string()));
        let value = provider.authorization(Some("Bearer client")).await.unwrap();
        assert_eq!(value, "Bearer fk-123");
        assert_eq!(provider.id(), "fixed_key");
        provider.warm_up().await.unwrap();
    }

    #[tokio::test]
    async fn pool_exhaustion_maps_to_pool_exhausted() {
        let mock = MockTokenEndpoint::start().await;
        let pool = AccountPool::new(
            vec![Account::refreshable("auth.json:refresh:1", "rt_bad")],
            mock.refresher(),
        );
        let provider = PoolProvider::new(Arc::new(pool));

        let err = provider.authorization(None).await.unwrap_err();
        assert!(matches!(err, ProviderError::PoolExhausted(_)));
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn pool_warm_up_tolerates_failing_accounts() {
        let mock = MockTokenEndpoint::start().await;
        let pool = AccountPool::new(
            vec![
                Account::refreshable("auth.json:refresh:1", "rt_bad"),
                Account::refreshable("auth.json:refresh:2", "rt_ok"),
            ],
            mock.refresher(),
        );
        let provider = PoolProvider::new(Arc::new(pool));

        provider.warm_up().await.unwrap();
        assert_eq!(mock.hits(), 2);

        let health = provider.health().await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.detail.unwrap()["accounts_with_token"], 1);
    }

    #[tokio::test]
    async fn refresh_token_provider_refreshes_and_persists() {
        let mock = MockTokenEndpoint::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let account = Account::refreshable("default", "rt_home")
            .with_persistence(TokenFile::new(path.clone()));
        let provider = RefreshTokenProvider::new("refresh_token_file", account, mock.refresher());

        assert_eq!(provider.health().await.status, "unhealthy");
        let value = provider.authorization(None).await.unwrap();
        assert_eq!(value, "Bearer at_home");
        assert_eq!(provider.id(), "refresh_token_file");

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["access_token"], "at_home");
        assert_eq!(saved["refresh_token"], "rt_home.next");
        assert_eq!(provider.health().await.status, "healthy");
    }

    #[tokio::test]
    async fn refresh_token_failure_maps_to_auth_error() {
        let mock = MockTokenEndpoint::start().await;
        let provider = RefreshTokenProvider::new(
            "refresh_token_env",
            Account::refreshable("default", "rt_bad"),
            mock.refresher(),
        );

        let err = provider.warm_up().await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
        let err = provider.authorization(None).await.unwrap_err();
        assert!(err.to_string().contains("invalid credentials"), "got: {err}");
    }
}
