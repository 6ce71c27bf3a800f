//! In-memory provider and catalog
//!
//! Back the gateway in tests and local mode. `MemoryStore` honors ranges on
//! reads and emits bytes in small chunks so the client-side trim/buffer
//! stages are exercised the same way they are against the real provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use tokio::sync::RwLock;
use tracing::debug;

use crate::catalog::{Catalog, CatalogRecord, NewFileRecord};
use crate::store::{
    ByteStream, ObjectInfo, ObjectMeta, ObjectStore, StorageIdentity, StoredObject, UploadSession,
};
use crate::{BoxFuture, ProviderError, Result};

/// Chunk size for read conduits. Small on purpose so range trimming sees
/// partial chunks in tests.
const READ_CHUNK: usize = 16 * 1024;

#[derive(Clone)]
struct MemObject {
    bytes: Bytes,
    name: String,
    content_type: String,
    account_name: String,
}

/// In-memory [`ObjectStore`].
#[derive(Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, MemObject>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("obj-{n}")
    }

    /// Number of stored objects (test observability).
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn chunked_stream(bytes: Bytes) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = bytes
        .chunks(READ_CHUNK)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

impl ObjectStore for MemoryStore {
    fn put_object<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
        data: Bytes,
    ) -> BoxFuture<'a, Result<StoredObject>> {
        Box::pin(async move {
            let object_id = self.mint_id();
            let size = data.len() as u64;
            self.objects.write().await.insert(
                object_id.clone(),
                MemObject {
                    bytes: data,
                    name: meta.name.clone(),
                    content_type: meta.content_type.clone(),
                    account_name: identity.account_name.clone(),
                },
            );
            debug!(object_id, size, "stored object in memory");
            Ok(StoredObject {
                object_id: object_id.clone(),
                name: meta.name.clone(),
                size,
                content_type: meta.content_type.clone(),
                content_link: format!("memory://{object_id}"),
                account_name: identity.account_name.clone(),
            })
        })
    }

    fn begin_upload<'a>(
        &'a self,
        identity: &'a StorageIdentity,
        meta: &'a ObjectMeta,
    ) -> BoxFuture<'a, Result<Box<dyn UploadSession>>> {
        Box::pin(async move {
            let session: Box<dyn UploadSession> = Box::new(MemoryUploadSession {
                objects: self.objects.clone(),
                object_id: self.mint_id(),
                name: meta.name.clone(),
                content_type: meta.content_type.clone(),
                account_name: identity.account_name.clone(),
                buffer: BytesMut::new(),
            });
            Ok(session)
        })
    }

    fn read<'a>(
        &'a self,
        _identity: &'a StorageIdentity,
        object_id: &'a str,
        range: Option<(u64, u64)>,
    ) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(async move {
            let objects = self.objects.read().await;
            let obj = objects
                .get(object_id)
                .ok_or_else(|| ProviderError::NotFound(object_id.to_string()))?;
            let bytes = match range {
                Some((start, end)) => {
                    let len = obj.bytes.len() as u64;
                    if start >= len {
                        return Err(ProviderError::Transfer(format!(
                            "range start {start} beyond object size {len}"
                        )));
                    }
                    let end = end.min(len - 1);
                    obj.bytes.slice(start as usize..=end as usize)
                }
                None => obj.bytes.clone(),
            };
            Ok(chunked_stream(bytes))
        })
    }

    fn head<'a>(
        &'a self,
        _identity: &'a StorageIdentity,
        object_id: &'a str,
    ) -> BoxFuture<'a, Result<ObjectInfo>> {
        Box::pin(async move {
            let objects = self.objects.read().await;
            let obj = objects
                .get(object_id)
                .ok_or_else(|| ProviderError::NotFound(object_id.to_string()))?;
            Ok(ObjectInfo {
                object_id: object_id.to_string(),
                size: obj.bytes.len() as u64,
                content_type: obj.content_type.clone(),
            })
        })
    }
}

struct MemoryUploadSession {
    objects: Arc<RwLock<HashMap<String, MemObject>>>,
    object_id: String,
    name: String,
    content_type: String,
    account_name: String,
    buffer: BytesMut,
}

impl UploadSession for MemoryUploadSession {
    fn put_chunk(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.buffer.extend_from_slice(&chunk);
            Ok(())
        })
    }

    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<StoredObject>> {
        Box::pin(async move {
            let bytes = self.buffer.freeze();
            let size = bytes.len() as u64;
            self.objects.write().await.insert(
                self.object_id.clone(),
                MemObject {
                    bytes,
                    name: self.name.clone(),
                    content_type: self.content_type.clone(),
                    account_name: self.account_name.clone(),
                },
            );
            Ok(StoredObject {
                object_id: self.object_id.clone(),
                name: self.name,
                size,
                content_type: self.content_type,
                content_link: format!("memory://{}", self.object_id),
                account_name: self.account_name,
            })
        })
    }
}

/// In-memory [`Catalog`].
#[derive(Default)]
pub struct MemoryCatalog {
    records: Arc<RwLock<HashMap<String, StoredRecord>>>,
    storage_used: Arc<RwLock<HashMap<String, u64>>>,
    next_id: AtomicU64,
}

struct StoredRecord {
    record: CatalogRecord,
    view_count: u64,
    viewers: Vec<String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `user_id` view permission on a file (test setup).
    pub async fn grant(&self, file_id: &str, user_id: &str) {
        if let Some(stored) = self.records.write().await.get_mut(file_id) {
            stored.viewers.push(user_id.to_string());
        }
    }

    /// View counter for a file (test observability).
    pub async fn view_count(&self, file_id: &str) -> u64 {
        self.records
            .read()
            .await
            .get(file_id)
            .map(|s| s.view_count)
            .unwrap_or(0)
    }

    /// Storage-used counter for an owner (test observability).
    pub async fn storage_used(&self, owner_id: &str) -> u64 {
        self.storage_used
            .read()
            .await
            .get(owner_id)
            .copied()
            .unwrap_or(0)
    }
}

impl Catalog for MemoryCatalog {
    fn create_record<'a>(&'a self, new: NewFileRecord) -> BoxFuture<'a, Result<CatalogRecord>> {
        Box::pin(async move {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            let file_id = format!("file-{n}");
            let record = CatalogRecord {
                file_id: file_id.clone(),
                object_id: new.object_id,
                account_name: new.account_name,
                owner_id: new.owner_id,
                name: new.name,
                content_type: new.content_type,
                size: new.size,
                is_public: new.is_public,
                content_link: new.content_link,
                media: new.media,
                thumbnail_link: new.thumbnail_link,
            };
            self.records.write().await.insert(
                file_id,
                StoredRecord {
                    record: record.clone(),
                    view_count: 0,
                    viewers: Vec::new(),
                },
            );
            Ok(record)
        })
    }

    fn lookup<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<Option<CatalogRecord>>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .get(file_id)
                .map(|s| s.record.clone()))
        })
    }

    fn has_permission<'a>(
        &'a self,
        file_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let records = self.records.read().await;
            let stored = records
                .get(file_id)
                .ok_or_else(|| ProviderError::NotFound(file_id.to_string()))?;
            Ok(stored.record.owner_id == user_id || stored.viewers.iter().any(|v| v == user_id))
        })
    }

    fn record_view<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(stored) = self.records.write().await.get_mut(file_id) {
                stored.view_count += 1;
            }
            Ok(())
        })
    }

    fn add_storage_used<'a>(&'a self, owner_id: &'a str, bytes: u64) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self
                .storage_used
                .write()
                .await
                .entry(owner_id.to_string())
                .or_default() += bytes;
            Ok(())
        })
    }
}
