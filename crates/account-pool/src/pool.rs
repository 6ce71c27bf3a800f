//! Pool state machine and health-scored account selection
//!
//! The pool holds every account record behind one `RwLock<HashMap>`; all
//! state transitions happen inside a single write critical section so
//! selection, reservation, and outcome recording never interleave.
//!
//! Selection is optimistic: the requested capacity is reserved on the chosen
//! account up front and settled when the outcome comes back. Success commits
//! the actual stored bytes, failure only releases the reservation, so
//! concurrent transfers can never oversubscribe an account's quota.
//!
//! Quarantine transitions happen automatically: an account blocked for
//! consecutive errors becomes eligible again once its cooldown expires,
//! either at selection time or during a maintenance sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::Secret;
use metrics::counter;
use provider::StorageIdentity;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::account::AccountRecord;
use crate::error::{Error, Result};

/// Tuning knobs for the pool state machine.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Consecutive errors that quarantine an account.
    pub block_threshold: u32,
    /// How long a quarantined account stays out of rotation.
    pub block_cooldown: Duration,
    /// Length of the per-account request-counting window.
    pub rate_window: Duration,
    /// When false, the per-minute request cap is tracked but not enforced.
    pub enforce_rate_window: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_threshold: 5,
            block_cooldown: Duration::from_secs(3600),
            rate_window: Duration::from_secs(60),
            enforce_rate_window: true,
        }
    }
}

/// A selected account holding a live quota reservation.
///
/// Consumed by [`AccountPool::record_success`] or
/// [`AccountPool::record_error`], which guarantees the reservation is
/// released exactly once.
#[derive(Debug)]
pub struct SelectedAccount {
    pub identity: StorageIdentity,
    /// Bytes reserved against the account's quota for this transfer.
    pub reserved: u64,
}

/// Credential material for one account, handed to the remote store when it
/// authenticates a request.
#[derive(Debug, Clone)]
pub struct PoolCredential {
    pub client_email: String,
    pub private_key: Secret<String>,
    pub scopes: Vec<String>,
}

/// Storage-account pool with health-scored selection and quota reservation.
pub struct AccountPool {
    accounts: RwLock<HashMap<String, AccountRecord>>,
    config: PoolConfig,
}

impl AccountPool {
    /// Create a pool over the given account records.
    pub fn new(accounts: Vec<AccountRecord>, config: PoolConfig) -> Self {
        let map: HashMap<String, AccountRecord> = accounts
            .into_iter()
            .map(|rec| (rec.name.clone(), rec))
            .collect();
        info!(accounts = map.len(), "account pool initialized");
        Self {
            accounts: RwLock::new(map),
            config,
        }
    }

    /// Select the fittest account with at least `required` bytes of free
    /// quota and reserve that capacity on it.
    ///
    /// Candidates must be active, unblocked, and inside their rate window;
    /// expired quarantines and stale rate windows are rolled forward during
    /// the scan. Ranking is by health score, then priority, then weight,
    /// then least quota used, with the account name as the final tie-break
    /// so selection is deterministic.
    ///
    /// Returns `NoAccountAvailable` when no account is usable at all and
    /// `CapacityExhausted` when usable accounts exist but none can hold
    /// `required` bytes.
    pub async fn select_account(&self, required: u64) -> Result<SelectedAccount> {
        let mut accounts = self.accounts.write().await;
        let now = Instant::now();

        let total = accounts.len();
        let mut inactive = 0usize;
        let mut blocked = 0usize;
        let mut rate_limited = 0usize;
        let mut usable: Vec<String> = Vec::new();

        for rec in accounts.values_mut() {
            Self::roll_windows(rec, now, &self.config);
            if !rec.is_active {
                inactive += 1;
            } else if rec.is_blocked {
                blocked += 1;
            } else if self.config.enforce_rate_window && !rec.can_admit() {
                rate_limited += 1;
            } else {
                usable.push(rec.name.clone());
            }
        }

        if usable.is_empty() {
            counter!("account_pool_selection_failures_total", "reason" => "unavailable")
                .increment(1);
            return Err(Error::NoAccountAvailable(format!(
                "0 of {total} accounts usable (inactive: {inactive}, blocked: {blocked}, \
                 rate-limited: {rate_limited})"
            )));
        }

        let mut candidates: Vec<&str> = usable
            .iter()
            .map(String::as_str)
            .filter(|name| accounts[*name].available_quota() >= required)
            .collect();

        if candidates.is_empty() {
            counter!("account_pool_selection_failures_total", "reason" => "capacity")
                .increment(1);
            return Err(Error::CapacityExhausted { required });
        }

        candidates.sort_by(|a, b| {
            let ra = &accounts[*a];
            let rb = &accounts[*b];
            rb.health_score()
                .total_cmp(&ra.health_score())
                .then(rb.priority.cmp(&ra.priority))
                .then(rb.weight.total_cmp(&ra.weight))
                .then(ra.quota_used.cmp(&rb.quota_used))
                .then(ra.name.cmp(&rb.name))
        });

        let name = candidates[0].to_string();
        let rec = accounts
            .get_mut(&name)
            .ok_or_else(|| Error::NotFound(name.clone()))?;
        rec.quota_reserved = rec.quota_reserved.saturating_add(required);
        rec.current_minute_requests += 1;

        debug!(
            account = %rec.name,
            required,
            health = rec.health_score(),
            reserved = rec.quota_reserved,
            "account selected"
        );
        counter!("account_pool_selections_total", "account" => rec.name.clone()).increment(1);

        Ok(SelectedAccount {
            identity: StorageIdentity {
                account_name: rec.name.clone(),
                client_email: rec.client_email.clone(),
            },
            reserved: required,
        })
    }

    /// Lease a specific account for a read, without reserving quota.
    ///
    /// Reads still count against the rate window and are refused while the
    /// account is quarantined; an expired quarantine is lifted inline.
    pub async fn lease_account(&self, name: &str) -> Result<SelectedAccount> {
        let mut accounts = self.accounts.write().await;
        let now = Instant::now();

        let rec = accounts
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Self::roll_windows(rec, now, &self.config);

        if !rec.is_active {
            return Err(Error::NoAccountAvailable(format!(
                "account {name} is inactive"
            )));
        }
        if rec.is_blocked {
            return Err(Error::NoAccountAvailable(format!(
                "account {name} is quarantined"
            )));
        }
        if self.config.enforce_rate_window && !rec.can_admit() {
            return Err(Error::NoAccountAvailable(format!(
                "account {name} is over its rate window"
            )));
        }
        rec.current_minute_requests += 1;

        Ok(SelectedAccount {
            identity: StorageIdentity {
                account_name: rec.name.clone(),
                client_email: rec.client_email.clone(),
            },
            reserved: 0,
        })
    }

    /// Record a successful transfer: release the reservation, commit the
    /// actual stored bytes, and fold the response time into the two-point
    /// rolling average.
    pub async fn record_success(&self, selection: SelectedAccount, stored: u64, elapsed_ms: f64) {
        let mut accounts = self.accounts.write().await;
        let name = &selection.identity.account_name;
        let Some(rec) = accounts.get_mut(name) else {
            warn!(account = %name, "success recorded for unknown account");
            return;
        };

        rec.quota_reserved = rec.quota_reserved.saturating_sub(selection.reserved);
        rec.quota_used = rec.quota_used.saturating_add(stored);
        rec.total_requests += 1;
        rec.successful_requests += 1;
        rec.consecutive_errors = 0;
        rec.success_rate = rec.successful_requests as f64 / rec.total_requests as f64 * 100.0;
        rec.average_response_time_ms = Some(match rec.average_response_time_ms {
            Some(prev) => (prev + elapsed_ms) / 2.0,
            None => elapsed_ms,
        });

        debug!(
            account = %name,
            stored,
            quota_used = rec.quota_used,
            "transfer succeeded"
        );
    }

    /// Record a failed transfer: release the reservation and bump the error
    /// counters. Crossing the consecutive-error threshold quarantines the
    /// account for the configured cooldown.
    pub async fn record_error(&self, selection: SelectedAccount, error: &str) {
        let mut accounts = self.accounts.write().await;
        let name = &selection.identity.account_name;
        let Some(rec) = accounts.get_mut(name) else {
            warn!(account = %name, "error recorded for unknown account");
            return;
        };

        rec.quota_reserved = rec.quota_reserved.saturating_sub(selection.reserved);
        rec.total_requests += 1;
        rec.failed_requests += 1;
        rec.error_count += 1;
        rec.consecutive_errors += 1;
        rec.last_error = Some(error.to_string());
        rec.success_rate = rec.successful_requests as f64 / rec.total_requests as f64 * 100.0;

        if rec.consecutive_errors >= self.config.block_threshold && !rec.is_blocked {
            rec.is_blocked = true;
            rec.blocked_reason = Some(format!("{} consecutive errors", rec.consecutive_errors));
            rec.blocked_until = Some(Instant::now() + self.config.block_cooldown);
            warn!(
                account = %name,
                consecutive_errors = rec.consecutive_errors,
                cooldown_secs = self.config.block_cooldown.as_secs(),
                "account quarantined"
            );
            counter!("account_pool_blocks_total", "account" => name.clone()).increment(1);
        } else {
            debug!(
                account = %name,
                consecutive_errors = rec.consecutive_errors,
                error,
                "transfer failed"
            );
        }
    }

    /// One maintenance sweep: lift expired quarantines and reset stale rate
    /// windows. Returns the number of accounts unblocked.
    pub async fn maintain(&self) -> usize {
        let mut accounts = self.accounts.write().await;
        let now = Instant::now();
        let mut unblocked = 0usize;

        for rec in accounts.values_mut() {
            let was_blocked = rec.is_blocked;
            Self::roll_windows(rec, now, &self.config);
            if was_blocked && !rec.is_blocked {
                unblocked += 1;
            }
        }
        if unblocked > 0 {
            info!(unblocked, "maintenance lifted expired quarantines");
        }
        unblocked
    }

    /// Credential material for one account, for the remote store's request
    /// signer.
    pub async fn credential(&self, name: &str) -> Result<PoolCredential> {
        let accounts = self.accounts.read().await;
        let rec = accounts
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Ok(PoolCredential {
            client_email: rec.client_email.clone(),
            private_key: rec.private_key.clone(),
            scopes: rec.scopes.clone(),
        })
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Status mapping: all accounts usable → healthy, some usable →
    /// degraded, none → unhealthy.
    pub async fn snapshot(&self) -> serde_json::Value {
        let accounts = self.accounts.read().await;
        let now = Instant::now();

        let mut entries = Vec::with_capacity(accounts.len());
        let mut usable = 0usize;
        let mut blocked = 0usize;
        let mut inactive = 0usize;

        let mut names: Vec<&String> = accounts.keys().collect();
        names.sort();

        for name in names {
            let rec = &accounts[name];
            let status = if !rec.is_active {
                inactive += 1;
                "inactive"
            } else if rec.is_blocked {
                blocked += 1;
                "blocked"
            } else {
                usable += 1;
                "available"
            };

            let mut entry = serde_json::json!({
                "name": rec.name,
                "status": status,
                "health_score": rec.health_score(),
                "quota_used": rec.quota_used,
                "quota_reserved": rec.quota_reserved,
                "quota_limit": rec.quota_limit,
                "quota_display": format!(
                    "{} / {}",
                    common::format_size(rec.quota_used),
                    common::format_size(rec.quota_limit)
                ),
                "success_rate": rec.success_rate,
                "consecutive_errors": rec.consecutive_errors,
            });
            if let Some(until) = rec.blocked_until {
                let remaining = until.saturating_duration_since(now).as_secs();
                entry["cooldown_remaining_secs"] = serde_json::json!(remaining);
            }
            if let Some(reason) = &rec.blocked_reason {
                entry["blocked_reason"] = serde_json::json!(reason);
            }
            if let Some(err) = &rec.last_error {
                entry["last_error"] = serde_json::json!(err);
            }
            entries.push(entry);
        }

        let total = accounts.len();
        let pool_status = if usable == total && total > 0 {
            "healthy"
        } else if usable > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": pool_status,
            "accounts_total": total,
            "accounts_available": usable,
            "accounts_blocked": blocked,
            "accounts_inactive": inactive,
            "accounts": entries
        })
    }

    /// Get a snapshot of all account names.
    pub async fn account_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.accounts.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Roll an account's time-based state forward: lift an expired
    /// quarantine, reset a stale rate window.
    fn roll_windows(rec: &mut AccountRecord, now: Instant, config: &PoolConfig) {
        if rec.is_blocked
            && let Some(until) = rec.blocked_until
            && now >= until
        {
            info!(account = %rec.name, "quarantine expired, account back in rotation");
            rec.is_blocked = false;
            rec.blocked_reason = None;
            rec.blocked_until = None;
            rec.consecutive_errors = 0;
        }
        if now.duration_since(rec.last_reset_time) >= config.rate_window {
            rec.current_minute_requests = 0;
            rec.last_reset_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountDefaults, CredentialFile};

    fn record(name: &str, quota_limit: u64) -> AccountRecord {
        AccountRecord::from_credential(
            name.to_string(),
            CredentialFile {
                client_email: format!("{name}@accounts.example"),
                private_key: format!("pk_{name}"),
                name: None,
                scopes: vec![],
                quota_limit: Some(quota_limit),
                priority: None,
                weight: None,
                requests_per_minute: None,
            },
            &AccountDefaults::default(),
        )
    }

    fn pool_with(records: Vec<AccountRecord>) -> AccountPool {
        AccountPool::new(records, PoolConfig::default())
    }

    #[tokio::test]
    async fn selects_and_reserves_capacity() {
        let pool = pool_with(vec![record("a", 1000)]);

        let sel = pool.select_account(400).await.unwrap();
        assert_eq!(sel.identity.account_name, "a");
        assert_eq!(sel.reserved, 400);

        // Remaining free quota is 600, so a second 700-byte transfer must
        // be refused even though nothing has committed yet.
        let err = pool.select_account(700).await.unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { required: 700 }));

        let sel2 = pool.select_account(600).await.unwrap();
        assert_eq!(sel2.reserved, 600);
    }

    #[tokio::test]
    async fn success_commits_actual_bytes_and_releases_reservation() {
        let pool = pool_with(vec![record("a", 1000)]);

        let sel = pool.select_account(400).await.unwrap();
        // Stored fewer bytes than reserved
        pool.record_success(sel, 300, 25.0).await;

        let snap = pool.snapshot().await;
        let acct = &snap["accounts"][0];
        assert_eq!(acct["quota_used"], 300);
        assert_eq!(acct["quota_reserved"], 0);
        assert_eq!(acct["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn error_releases_reservation_without_committing() {
        let pool = pool_with(vec![record("a", 1000)]);

        let sel = pool.select_account(900).await.unwrap();
        pool.record_error(sel, "upstream 500").await;

        let snap = pool.snapshot().await;
        let acct = &snap["accounts"][0];
        assert_eq!(acct["quota_used"], 0);
        assert_eq!(acct["quota_reserved"], 0);
        assert_eq!(acct["consecutive_errors"], 1);
        assert_eq!(acct["last_error"], "upstream 500");

        // Full capacity is available again
        let sel = pool.select_account(1000).await.unwrap();
        assert_eq!(sel.reserved, 1000);
    }

    #[tokio::test]
    async fn prefers_healthier_account() {
        let mut degraded = record("a", 1000);
        degraded.total_requests = 10;
        degraded.failed_requests = 5;
        let pool = pool_with(vec![degraded, record("b", 1000)]);

        let sel = pool.select_account(10).await.unwrap();
        assert_eq!(sel.identity.account_name, "b");
    }

    #[tokio::test]
    async fn blocked_account_is_skipped() {
        let mut blocked = record("a", 1000);
        blocked.is_blocked = true;
        blocked.blocked_until = Some(Instant::now() + Duration::from_secs(3600));
        let pool = pool_with(vec![blocked, record("b", 100)]);

        // Only "b" is usable; it can take 50 bytes
        let sel = pool.select_account(50).await.unwrap();
        assert_eq!(sel.identity.account_name, "b");
    }

    #[tokio::test]
    async fn ties_break_by_name_for_determinism() {
        let pool = pool_with(vec![record("beta", 1000), record("alpha", 1000)]);

        let sel = pool.select_account(0).await.unwrap();
        assert_eq!(sel.identity.account_name, "alpha");
    }

    #[tokio::test]
    async fn less_used_account_wins_on_equal_health() {
        let mut used = record("a", 1000);
        used.quota_used = 500;
        let pool = pool_with(vec![used, record("b", 1000)]);

        let sel = pool.select_account(10).await.unwrap();
        assert_eq!(sel.identity.account_name, "b");
    }

    #[tokio::test]
    async fn higher_priority_wins_on_equal_health() {
        let mut preferred = record("zzz", 1000);
        preferred.priority = 5;
        let pool = pool_with(vec![record("aaa", 1000), preferred]);

        let sel = pool.select_account(10).await.unwrap();
        assert_eq!(sel.identity.account_name, "zzz");
    }

    #[tokio::test]
    async fn no_account_vs_capacity_exhausted() {
        let mut inactive = record("a", 1000);
        inactive.is_active = false;
        let pool = pool_with(vec![inactive]);
        let err = pool.select_account(10).await.unwrap_err();
        assert!(matches!(err, Error::NoAccountAvailable(_)));
        assert!(err.to_string().contains("inactive: 1"), "got: {err}");

        let pool = pool_with(vec![record("a", 100)]);
        let err = pool.select_account(500).await.unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { required: 500 }));
    }

    #[tokio::test]
    async fn fifth_consecutive_error_quarantines() {
        let pool = pool_with(vec![record("a", 1000)]);

        for n in 1..=4 {
            let sel = pool.select_account(1).await.unwrap();
            pool.record_error(sel, "boom").await;
            let snap = pool.snapshot().await;
            assert_eq!(
                snap["accounts"][0]["status"], "available",
                "quarantined too early at error {n}"
            );
        }

        let sel = pool.select_account(1).await.unwrap();
        pool.record_error(sel, "boom").await;

        let snap = pool.snapshot().await;
        let acct = &snap["accounts"][0];
        assert_eq!(acct["status"], "blocked");
        assert_eq!(acct["health_score"], 0.0);
        assert_eq!(acct["blocked_reason"], "5 consecutive errors");
        let remaining = acct["cooldown_remaining_secs"].as_u64().unwrap();
        assert!(remaining > 3500, "cooldown should be about an hour");

        let err = pool.select_account(1).await.unwrap_err();
        assert!(matches!(err, Error::NoAccountAvailable(_)));
    }

    #[tokio::test]
    async fn success_resets_consecutive_errors() {
        let pool = pool_with(vec![record("a", 1000)]);

        for _ in 0..4 {
            let sel = pool.select_account(1).await.unwrap();
            pool.record_error(sel, "boom").await;
        }
        let sel = pool.select_account(1).await.unwrap();
        pool.record_success(sel, 1, 10.0).await;

        let snap = pool.snapshot().await;
        assert_eq!(snap["accounts"][0]["consecutive_errors"], 0);
        assert_eq!(snap["accounts"][0]["status"], "available");
    }

    #[tokio::test]
    async fn maintain_lifts_expired_quarantine() {
        let config = PoolConfig {
            block_cooldown: Duration::from_millis(0),
            ..PoolConfig::default()
        };
        let pool = AccountPool::new(vec![record("a", 1000)], config);

        for _ in 0..5 {
            let sel = pool.select_account(1).await.unwrap();
            pool.record_error(sel, "boom").await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        let unblocked = pool.maintain().await;
        assert_eq!(unblocked, 1);

        let snap = pool.snapshot().await;
        let acct = &snap["accounts"][0];
        assert_eq!(acct["status"], "available");
        assert_eq!(acct["consecutive_errors"], 0);

        // Back in rotation for selection too
        pool.select_account(1).await.unwrap();
    }

    #[tokio::test]
    async fn expired_quarantine_lifts_inline_at_selection() {
        let config = PoolConfig {
            block_cooldown: Duration::from_millis(0),
            ..PoolConfig::default()
        };
        let pool = AccountPool::new(vec![record("a", 1000)], config);

        for _ in 0..5 {
            let sel = pool.select_account(1).await.unwrap();
            pool.record_error(sel, "boom").await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        // No maintain() call; selection itself lifts the expired block
        let sel = pool.select_account(1).await.unwrap();
        assert_eq!(sel.identity.account_name, "a");
    }

    #[tokio::test]
    async fn rate_window_refuses_after_cap() {
        let mut rec = record("a", 1000);
        rec.requests_per_minute = 2;
        let pool = pool_with(vec![rec]);

        pool.select_account(1).await.unwrap();
        pool.select_account(1).await.unwrap();

        let err = pool.select_account(1).await.unwrap_err();
        assert!(matches!(err, Error::NoAccountAvailable(_)));
        assert!(err.to_string().contains("rate-limited: 1"), "got: {err}");
    }

    #[tokio::test]
    async fn rate_window_not_enforced_when_disabled() {
        let mut rec = record("a", 1000);
        rec.requests_per_minute = 1;
        let config = PoolConfig {
            enforce_rate_window: false,
            ..PoolConfig::default()
        };
        let pool = AccountPool::new(vec![rec], config);

        for _ in 0..10 {
            pool.select_account(1).await.unwrap();
        }
    }

    #[tokio::test]
    async fn rate_window_resets_after_interval() {
        let mut rec = record("a", 1000);
        rec.requests_per_minute = 1;
        let config = PoolConfig {
            rate_window: Duration::from_millis(0),
            ..PoolConfig::default()
        };
        let pool = AccountPool::new(vec![rec], config);

        // Window length zero means every scan starts a fresh window
        pool.select_account(1).await.unwrap();
        pool.select_account(1).await.unwrap();
    }

    #[tokio::test]
    async fn lease_requires_usable_account() {
        let mut blocked = record("b", 1000);
        blocked.is_blocked = true;
        blocked.blocked_until = Some(Instant::now() + Duration::from_secs(3600));
        let pool = pool_with(vec![record("a", 1000), blocked]);

        let lease = pool.lease_account("a").await.unwrap();
        assert_eq!(lease.reserved, 0);
        assert_eq!(lease.identity.client_email, "a@accounts.example");

        let err = pool.lease_account("b").await.unwrap_err();
        assert!(matches!(err, Error::NoAccountAvailable(_)));

        let err = pool.lease_account("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn response_time_two_point_average() {
        let pool = pool_with(vec![record("a", 1000)]);

        let sel = pool.select_account(1).await.unwrap();
        pool.record_success(sel, 1, 100.0).await;
        let sel = pool.select_account(1).await.unwrap();
        pool.record_success(sel, 1, 50.0).await;

        let accounts = pool.accounts.read().await;
        // (100 + 50) / 2, not a full-history mean
        assert_eq!(accounts["a"].average_response_time_ms, Some(75.0));
    }

    #[tokio::test]
    async fn snapshot_status_mapping() {
        let pool = pool_with(vec![record("a", 1000), record("b", 1000)]);
        assert_eq!(pool.snapshot().await["status"], "healthy");

        for _ in 0..5 {
            let sel = pool.lease_account("a").await.unwrap();
            pool.record_error(sel, "boom").await;
        }
        let snap = pool.snapshot().await;
        assert_eq!(snap["status"], "degraded");
        assert_eq!(snap["accounts_blocked"], 1);

        for _ in 0..5 {
            let sel = pool.lease_account("b").await.unwrap();
            pool.record_error(sel, "boom").await;
        }
        assert_eq!(pool.snapshot().await["status"], "unhealthy");
    }

    #[tokio::test]
    async fn snapshot_empty_pool_is_unhealthy() {
        let pool = pool_with(vec![]);
        let snap = pool.snapshot().await;
        assert_eq!(snap["status"], "unhealthy");
        assert_eq!(snap["accounts_total"], 0);
    }

    #[tokio::test]
    async fn snapshot_formats_quota_display() {
        let mut rec = record("a", 2 * 1024 * 1024);
        rec.quota_used = 1024 * 1024;
        let pool = pool_with(vec![rec]);

        let snap = pool.snapshot().await;
        assert_eq!(snap["accounts"][0]["quota_display"], "1.00 MiB / 2.00 MiB");
    }

    #[tokio::test]
    async fn credential_lookup() {
        let pool = pool_with(vec![record("a", 1000)]);

        let cred = pool.credential("a").await.unwrap();
        assert_eq!(cred.client_email, "a@accounts.example");
        assert_eq!(cred.private_key.expose(), "pk_a");

        assert!(matches!(
            pool.credential("missing").await,
            Err(Error::NotFound(_))
        ));
    }
}
