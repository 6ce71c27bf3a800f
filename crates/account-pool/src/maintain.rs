//! Periodic pool maintenance
//!
//! Spawns a background task that sweeps the pool on an interval, lifting
//! expired quarantines and resetting stale rate windows. Selection also
//! rolls these windows forward inline, so the sweep mainly keeps the health
//! snapshot honest on an idle pool.

use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;

use crate::pool::AccountPool;

/// Spawn a background task that runs a maintenance sweep every `interval`.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_maintenance_task(
    pool: Arc<AccountPool>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick — accounts were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            pool.maintain().await;

            let snap = pool.snapshot().await;
            if let Some(available) = snap["accounts_available"].as_u64() {
                gauge!("account_pool_accounts_available").set(available as f64);
            }
            if let Some(blocked) = snap["accounts_blocked"].as_u64() {
                gauge!("account_pool_accounts_blocked").set(blocked as f64);
            }
        }
    })
}
