//! Round-robin account selection with bounded failover
//!
//! The cursor advances by one (mod pool size) on every attempt, successful
//! or not. A request makes at most one attempt per account, so a single
//! broken account costs at most one failed refresh per request and can
//! never starve the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use droid_auth::{Account, TokenRefresher};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Ordered set of accounts plus a rotation cursor.
///
/// Accounts are shared via `Arc` so the background refresh task can hold
/// them; each account serializes its own refreshes, so unrelated accounts
/// refresh concurrently.
pub struct AccountPool {
    accounts: Vec<Arc<Account>>,
    cursor: AtomicUsize,
    refresher: TokenRefresher,
}

impl AccountPool {
    /// Create a pool over `accounts`, in dispatch order. The cursor starts at 0.
    pub fn new(accounts: Vec<Account>, refresher: TokenRefresher) -> Self {
        let refreshable = accounts.iter().filter(|a| a.is_refreshable()).count();
        info!(
            accounts = accounts.len(),
            fixed_keys = accounts.len() - refreshable,
            refreshable,
            "pool initialized"
        );
        Self {
            accounts: accounts.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
            refresher,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Index of the account the next attempt will use.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    /// Claim the account at the cursor and advance the cursor by one.
    fn advance(&self, n: usize) -> usize {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % n))
            .unwrap_or_else(|prev| prev)
    }

    /// Get a `Bearer <token>` value from the next usable account.
    ///
    /// Tries up to `len()` accounts starting at the cursor. Returns
    /// `PoolExhausted` when every attempt in this call failed; the pool stays
    /// usable for later calls.
    pub async fn get_token(&self) -> Result<String> {
        let n = self.accounts.len();
        if n == 0 {
            return Err(Error::PoolExhausted("no accounts configured".into()));
        }

        for _ in 0..n {
            let idx = self.advance(n);
            let account = &self.accounts[idx];

            match account.ensure_token(&self.refresher).await {
                Ok(token) => {
                    debug!(account = account.label(), "selected pool account");
                    return Ok(format!("Bearer {token}"));
                }
                Err(e) => {
                    warn!(account = account.label(), error = %e, "failed to obtain token from account");
                    metrics::counter!("credential_pool_attempt_failures_total").increment(1);
                }
            }
        }

        metrics::counter!("credential_pool_exhausted_total").increment(1);
        Err(Error::PoolExhausted(format!(
            "unable to obtain a token from any of {n} accounts"
        )))
    }

    /// Refresh every refreshable account once, concurrently.
    ///
    /// Failures are logged and leave the account in the pool. Returns the
    /// number of accounts refreshed.
    pub async fn warm_up(&self) -> usize {
        let results = join_all(
            self.accounts
                .iter()
                .filter(|a| a.is_refreshable())
                .map(|account| async move {
                    match account.refresh(&self.refresher).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(account = account.label(), error = %e, "failed to initialize account");
                            false
                        }
                    }
                }),
        )
        .await;

        let refreshed = results.iter().filter(|ok| **ok).count();
        info!(
            accounts = self.accounts.len(),
            refreshed, "pool warm-up complete"
        );
        refreshed
    }

    /// Pool health summary.
    ///
    /// Status mapping: every account holds a usable credential → healthy,
    /// some do → degraded, none (or empty pool) → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let snapshots = join_all(self.accounts.iter().map(|a| a.snapshot())).await;

        let total = snapshots.len();
        let with_token = snapshots.iter().filter(|s| s.has_token).count();
        let fixed = snapshots.iter().filter(|s| s.kind == "fixed_key").count();

        let status = if total > 0 && with_token == total {
            "healthy"
        } else if with_token > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "accounts_total": total,
            "accounts_fixed": fixed,
            "accounts_refreshable": total - fixed,
            "accounts_with_token": with_token,
            "cursor": self.cursor(),
            "accounts": snapshots,
        })
    }
}
