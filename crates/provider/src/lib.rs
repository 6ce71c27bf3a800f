//! Abstractions over the remote object-storage provider and the durable catalog
//!
//! Defines the `ObjectStore` trait that decouples the upload/streaming
//! pipelines from the concrete provider, and the `Catalog` trait for the
//! durable file records the gateway consumes but does not own. `MemoryStore`
//! and `MemoryCatalog` back tests and local mode; the gateway service ships
//! the reqwest-based remote implementation.

pub mod catalog;
pub mod memory;
pub mod store;

pub use catalog::{Catalog, CatalogRecord, MediaAttributes, NewFileRecord};
pub use memory::{MemoryCatalog, MemoryStore};
pub use store::{
    ByteStream, ObjectInfo, ObjectMeta, ObjectStore, StorageIdentity, StoredObject, UploadSession,
};

use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by the dyn-compatible provider traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from provider and catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected or failed a transfer or read.
    #[error("upstream transfer error: {0}")]
    Transfer(String),

    /// The referenced object does not exist under the given identity.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The provider could not be reached at all.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The durable catalog rejected an operation.
    #[error("catalog error: {0}")]
    Catalog(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
