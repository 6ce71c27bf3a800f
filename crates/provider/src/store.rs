//! Object store trait and wire types
//!
//! The pipelines talk to the remote provider exclusively through
//! `ObjectStore`. Implementations authenticate with a `StorageIdentity`
//! resolved by the account pool; the trait itself is identity-agnostic so
//! tests can swap in `MemoryStore` without any credential plumbing.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn ObjectStore>` is shared across all in-flight jobs and streams).

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

use crate::{BoxFuture, Result};

/// Byte conduit between the provider and a pipeline.
///
/// Items are `io::Result<Bytes>` so downstream adapters (range trim,
/// buffering) compose with axum body streams without conversion.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// One credential identity against the remote provider, as resolved by the
/// pool at selection time. Carries only what a request needs; the full
/// account record (counters, quota) stays inside the pool.
#[derive(Debug, Clone)]
pub struct StorageIdentity {
    /// Pool account name, used for error reporting back to the pool.
    pub account_name: String,
    /// Principal the provider authenticates as.
    pub client_email: String,
}

/// Metadata accompanying an object write.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub name: String,
    pub content_type: String,
    /// Declared size in bytes. Chunked sessions may finish with a different
    /// actual size; the stored object reports the real one.
    pub size: u64,
    pub description: Option<String>,
    /// Target container/folder id at the provider, when any.
    pub parent: Option<String>,
}

/// Reference to a durably stored object, returned on transfer success.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub object_id: String,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    /// Direct-download link as reported by the provider.
    pub content_link: String,
    /// Name of the account the object was written under.
    pub account_name: String,
}

/// In-progress chunked/resumable transfer.
///
/// Obtained from [`ObjectStore::begin_upload`]; the caller feeds chunks and
/// finishes the session. Dropping a session without finishing abandons the
/// transfer on the provider side.
pub trait UploadSession: Send {
    /// Append one chunk to the session.
    fn put_chunk(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Finalize the transfer and return the stored object reference.
    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<StoredObject>>;
}

/// Abstraction over the quota-metered remote object-storage provider.
pub trait ObjectStore: Send + Sync {
    /// Single-shot write of a fully buffered payload.
    fn put_object<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
        data: Bytes,
    ) -> BoxFuture<'a, Result<StoredObject>>;

    /// Open a chunked/resumable session for payloads above the in-memory
    /// threshold.
    fn begin_upload<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
    ) -> BoxFuture<'a, Result<Box<dyn UploadSession>>>;

    /// Open a read conduit, optionally limited to an inclusive byte range.
    ///
    /// Implementations pass the range through to the provider when
    /// supported; callers must still trim client-side since pass-through is
    /// best effort.
    fn read<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        object_id: &'a str,
        range: Option<(u64, u64)>,
    ) -> BoxFuture<'a, Result<ByteStream>>;

    /// Object size and content type without a body read.
    fn head<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        object_id: &'a str,
    ) -> BoxFuture<'a, Result<ObjectInfo>>;
}

/// Result of a metadata-only lookup.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub object_id: String,
    pub size: u64,
    pub content_type: String,
}
