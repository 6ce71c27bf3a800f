//! Storage-account pool for the remote object-storage provider
//!
//! Manages the fixed set of credential identities ("storage accounts") the
//! gateway transfers bytes through. Each account has independent quota and
//! rate limits; the pool tracks per-account health and picks the fittest
//! candidate for every transfer.
//!
//! Account lifecycle:
//! 1. Startup loads one JSON credential file per account from a directory
//! 2. Selection filters to active, unblocked accounts with enough remaining
//!    quota, ranks by health score, and reserves the requested capacity
//! 3. Transfer outcome is recorded back: success commits bytes to the quota,
//!    failure bumps the error counters
//! 4. Five consecutive failures quarantine the account for the cooldown
//!    duration; maintenance lifts expired blocks and resets rate windows

pub mod account;
pub mod error;
pub mod loader;
pub mod maintain;
pub mod pool;

pub use account::{AccountDefaults, AccountRecord, CredentialFile};
pub use error::{Error, Result};
pub use loader::load_accounts;
pub use maintain::spawn_maintenance_task;
pub use pool::{AccountPool, PoolConfig, PoolCredential, SelectedAccount};
