//! Durable catalog trait
//!
//! The catalog (file/folder/user records) is an external collaborator: the
//! gateway consumes a handful of operations and never persists account
//! counters through it. Only the operations the pipelines need appear here.

use crate::{BoxFuture, Result};

/// Probed characteristics carried on a file record. All optional; a file
/// that was never probed (or whose probe failed) leaves them unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaAttributes {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f64>,
}

/// Catalog view of one stored file.
#[derive(Debug, Clone)]
pub struct CatalogRecord {
    pub file_id: String,
    /// Provider-side object id the bytes live under.
    pub object_id: String,
    /// Account the object was written with; streaming resolves reads
    /// through this identity.
    pub account_name: String,
    pub owner_id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub is_public: bool,
    /// Provider link to the stored content.
    pub content_link: String,
    pub media: MediaAttributes,
    /// Provider link to the uploaded thumbnail, when one was generated.
    pub thumbnail_link: Option<String>,
}

/// Fields for a new file record created after a successful transfer.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub object_id: String,
    pub account_name: String,
    pub owner_id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub is_public: bool,
    pub folder_id: Option<String>,
    pub description: Option<String>,
    pub content_link: String,
    pub media: MediaAttributes,
    pub thumbnail_link: Option<String>,
}

/// Operations the gateway consumes from the durable catalog.
pub trait Catalog: Send + Sync {
    /// Create a file record; returns the assigned file id.
    fn create_record<'a>(&'a self, record: NewFileRecord) -> BoxFuture<'a, Result<CatalogRecord>>;

    /// Look up a file record. `Ok(None)` when the id is unknown.
    fn lookup<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<Option<CatalogRecord>>>;

    /// Whether `user_id` may view the (non-public) file.
    fn has_permission<'a>(
        &'a self,
        file_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Bump the view counter and last-viewed timestamp after a stream ends
    /// naturally.
    fn record_view<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Add transferred bytes to the owner's storage-used counter.
    fn add_storage_used<'a>(&'a self, owner_id: &'a str, bytes: u64) -> BoxFuture<'a, Result<()>>;
}
