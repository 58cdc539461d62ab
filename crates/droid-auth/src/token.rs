//! Refresh-token exchange
//!
//! POSTs `grant_type=refresh_token` to the identity provider and returns the
//! rotated access/refresh pair. The provider rotates the refresh token on
//! every exchange, so callers must store the returned one and discard the old.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client_id::ClientIdGenerator;
use crate::constants::{DEFAULT_REFRESH_TIMEOUT, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// Response from the token endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// Authenticated user details, logged after a successful refresh.
#[derive(Debug, Deserialize, Serialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Exchanges refresh tokens against a fixed endpoint with a process-wide client id.
///
/// Cheap to clone; `reqwest::Client` shares its connection pool.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    timeout: Duration,
}

impl TokenRefresher {
    /// Create a refresher for the given endpoint. The client id is generated
    /// once here and reused for every refresh call.
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        client_ids: &dyn ClientIdGenerator,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: client_ids.generate(),
            timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Refresher for the production identity provider.
    pub fn with_default_endpoint(
        client: reqwest::Client,
        client_ids: &dyn ClientIdGenerator,
    ) -> Self {
        Self::new(client, TOKEN_ENDPOINT, client_ids)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Exchange a refresh token for a new access/refresh pair.
    ///
    /// A connect failure or timeout is retried once. HTTP error statuses are
    /// returned immediately: the refresh token may already be consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = match self.send(refresh_token).await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!(error = %e, "token refresh request failed, retrying once");
                self.send(refresh_token)
                    .await
                    .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?
            }
            Err(e) => return Err(Error::Http(format!("token refresh request failed: {e}"))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 401/403 means the refresh token is revoked or already rotated
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "refresh token rejected ({status}): {body}"
                )));
            }

            return Err(Error::RefreshFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))?;
        debug!(endpoint = %self.endpoint, "token endpoint accepted refresh");
        Ok(token)
    }

    async fn send(&self, refresh_token: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await
    }
}
