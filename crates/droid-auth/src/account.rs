//! Accounts: one outbound credential each
//!
//! An account is either a static API key or a refreshable token pair. A
//! refreshable account keeps its token state behind a tokio Mutex that is
//! held across the refresh call, so concurrent callers that find the token
//! stale queue behind a single in-flight refresh and then reuse its result.
//! The provider rotates refresh tokens on every exchange; two parallel
//! refreshes with the same token would invalidate each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::REFRESH_INTERVAL;
use crate::error::{Error, Result};
use crate::token::{TokenRefresher, TokenResponse};
use crate::token_file::TokenFile;

/// Mutable token state of a refreshable account.
#[derive(Debug)]
pub struct TokenState {
    access_token: Option<Secret<String>>,
    refresh_token: Secret<String>,
    last_refresh: Option<SystemTime>,
}

impl TokenState {
    fn needs_refresh(&self, stale_after: Duration) -> bool {
        self.access_token.is_none() || is_stale(self.last_refresh, stale_after)
    }

    fn apply(&mut self, response: &TokenResponse) {
        self.access_token = Some(Secret::new(response.access_token.clone()));
        self.refresh_token = Secret::new(response.refresh_token.clone());
        self.last_refresh = Some(SystemTime::now());
    }
}

/// Which kind of credential an account holds. Exactly one of the static key
/// or the refresh token exists, by construction.
#[derive(Debug)]
pub enum AccountKind {
    FixedKey(Secret<String>),
    Refreshable(Mutex<TokenState>),
}

/// Point-in-time view of an account for health output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSnapshot {
    pub label: String,
    pub kind: &'static str,
    pub has_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_age_secs: Option<u64>,
    /// A refresh was in flight; the age is unknown until it finishes
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub refreshing: bool,
}

/// One credential unit.
#[derive(Debug)]
pub struct Account {
    label: String,
    kind: AccountKind,
    stale_after: Duration,
    persistence: Option<TokenFile>,
    /// Mirrors `access_token.is_some()` so health never waits on a refresh.
    has_token: AtomicBool,
}

/// Whether a token last refreshed at `last_refresh` must be refreshed now.
///
/// Never-refreshed tokens are stale. A timestamp in the future (clock skew)
/// counts as age zero.
pub fn is_stale(last_refresh: Option<SystemTime>, stale_after: Duration) -> bool {
    match last_refresh {
        None => true,
        Some(ts) => ts.elapsed().unwrap_or(Duration::ZERO) >= stale_after,
    }
}

impl Account {
    pub fn fixed_key(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: AccountKind::FixedKey(Secret::new(key.into())),
            stale_after: REFRESH_INTERVAL,
            persistence: None,
            has_token: AtomicBool::new(true),
        }
    }

    pub fn refreshable(label: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: AccountKind::Refreshable(Mutex::new(TokenState {
                access_token: None,
                refresh_token: Secret::new(refresh_token.into()),
                last_refresh: None,
            })),
            stale_after: REFRESH_INTERVAL,
            persistence: None,
            has_token: AtomicBool::new(false),
        }
    }

    /// Seed a previously issued access token. With no `last_refresh` the token
    /// is still refreshed on first use.
    pub fn with_access_token(
        mut self,
        access_token: impl Into<String>,
        last_refresh: Option<SystemTime>,
    ) -> Self {
        if let AccountKind::Refreshable(state) = &mut self.kind {
            let state = state.get_mut();
            state.access_token = Some(Secret::new(access_token.into()));
            state.last_refresh = last_refresh;
            *self.has_token.get_mut() = true;
        }
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Persist every rotated token pair to `file` (singleton accounts only).
    pub fn with_persistence(mut self, file: TokenFile) -> Self {
        self.persistence = Some(file);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &AccountKind {
        &self.kind
    }

    pub fn is_refreshable(&self) -> bool {
        matches!(self.kind, AccountKind::Refreshable(_))
    }

    /// Return a usable token, refreshing first when the cached one is stale.
    ///
    /// Fixed keys never touch the network. On refresh failure the existing
    /// token fields are left as they were and the error is returned.
    pub async fn ensure_token(&self, refresher: &TokenRefresher) -> Result<String> {
        let state = match &self.kind {
            AccountKind::FixedKey(key) => return Ok(key.expose().clone()),
            AccountKind::Refreshable(state) => state,
        };

        let mut state = state.lock().await;
        if state.needs_refresh(self.stale_after) {
            debug!(account = %self.label, "access token missing or stale, refreshing");
            self.refresh_locked(&mut state, refresher).await?;
        }

        state
            .access_token
            .as_ref()
            .map(|token| token.expose().clone())
            .ok_or_else(|| Error::MissingToken(format!("account {}", self.label)))
    }

    /// Refresh unconditionally. No-op for fixed keys.
    pub async fn refresh(&self, refresher: &TokenRefresher) -> Result<()> {
        if let AccountKind::Refreshable(state) = &self.kind {
            let mut state = state.lock().await;
            self.refresh_locked(&mut state, refresher).await?;
        }
        Ok(())
    }

    async fn refresh_locked(
        &self,
        state: &mut TokenState,
        refresher: &TokenRefresher,
    ) -> Result<()> {
        let response = match refresher.refresh(state.refresh_token.expose()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(account = %self.label, error = %e, "token refresh failed");
                metrics::counter!("credential_refresh_total", "outcome" => "failure").increment(1);
                return Err(e);
            }
        };

        state.apply(&response);
        self.has_token.store(true, Ordering::Release);
        metrics::counter!("credential_refresh_total", "outcome" => "success").increment(1);

        if let Some(user) = &response.user {
            let name = format!(
                "{} {}",
                user.first_name.as_deref().unwrap_or(""),
                user.last_name.as_deref().unwrap_or("")
            );
            info!(
                account = %self.label,
                email = user.email.as_deref().unwrap_or("-"),
                name = name.trim(),
                user_id = user.id.as_deref().unwrap_or("-"),
                organization_id = response.organization_id.as_deref().unwrap_or("-"),
                "authenticated"
            );
        }

        if let Some(file) = &self.persistence {
            file.save(&response.access_token, &response.refresh_token).await;
        }

        info!(account = %self.label, "access token refreshed");
        Ok(())
    }

    /// Health view of this account.
    ///
    /// Never waits for an in-flight refresh: while one holds the state lock,
    /// the snapshot reports `refreshing` without the refresh age.
    pub async fn snapshot(&self) -> AccountSnapshot {
        let state = match &self.kind {
            AccountKind::FixedKey(_) => {
                return AccountSnapshot {
                    label: self.label.clone(),
                    kind: "fixed_key",
                    has_token: true,
                    last_refresh_age_secs: None,
                    refreshing: false,
                };
            }
            AccountKind::Refreshable(state) => state,
        };

        let (last_refresh_age_secs, refreshing) = match state.try_lock() {
            Ok(state) => (
                state
                    .last_refresh
                    .map(|ts| ts.elapsed().unwrap_or(Duration::ZERO).as_secs()),
                false,
            ),
            Err(_) => (None, true),
        };
        AccountSnapshot {
            label: self.label.clone(),
            kind: "refresh_token",
            has_token: self.has_token.load(Ordering::Acquire),
            last_refresh_age_secs,
            refreshing,
        }
    }
}
