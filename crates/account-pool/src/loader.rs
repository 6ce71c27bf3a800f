//! Credential directory loading
//!
//! One JSON file per account. The directory is created when missing so a
//! fresh deployment starts with an empty (unhealthy) pool instead of
//! failing; a malformed file is logged and skipped rather than taking the
//! rest of the pool down with it.

use std::path::Path;

use tracing::{info, warn};

use crate::account::{AccountDefaults, AccountRecord, CredentialFile};

/// Load account records from every `*.json` file in `dir`.
///
/// The account name comes from the credential file's `name` field, falling
/// back to the file stem. Files that fail to read or parse are skipped with
/// a warning. Returns records sorted by name so startup logs are stable.
pub async fn load_accounts(
    dir: &Path,
    defaults: &AccountDefaults,
) -> common::Result<Vec<AccountRecord>> {
    if !tokio::fs::try_exists(dir).await? {
        info!(dir = %dir.display(), "credential directory missing, creating");
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut records = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read credential file, skipping");
                continue;
            }
        };
        let file: CredentialFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "malformed credential file, skipping");
                continue;
            }
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("account")
            .to_string();
        let name = file.name.clone().unwrap_or(stem);

        info!(account = %name, client_email = %file.client_email, "loaded storage account");
        records.push(AccountRecord::from_credential(name, file, defaults));
    }

    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}
