//! Proactive background token refresh
//!
//! Spawns a periodic task that walks the pool and calls `ensure_token` on
//! every refreshable account. The staleness window decides whether a
//! refresh actually happens, so a cycle over fresh tokens makes no network
//! calls. Keeping tokens fresh in the background removes most request-time
//! refresh latency.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::pool::AccountPool;

/// Spawn a background task that keeps pool tokens fresh.
///
/// Runs every `interval`. Failures are logged and retried on the next cycle;
/// the account stays in the pool.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_refresh_task(
    pool: Arc<AccountPool>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick — warm-up already ran
        ticker.tick().await;

        loop {
            ticker.tick().await;
            refresh_cycle(&pool).await;
        }
    })
}

/// Run one refresh cycle over all refreshable accounts.
async fn refresh_cycle(pool: &AccountPool) {
    for account in pool.accounts().iter().filter(|a| a.is_refreshable()) {
        match account.ensure_token(pool.refresher()).await {
            Ok(_) => debug!(account = account.label(), "background check complete"),
            Err(e) => {
                warn!(account = account.label(), error = %e, "background refresh failed, will retry next cycle");
            }
        }
    }
}
