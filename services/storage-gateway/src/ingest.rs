//! Ingestion pipeline
//!
//! Drives one upload job end to end: stage the payload into the arena,
//! probe and optionally re-encode video, pick an account, transfer the
//! bytes, and settle the outcome with the pool and the catalog. The arena
//! scope is purged on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use account_pool::AccountPool;
use bytes::Bytes;
use provider::{Catalog, CatalogRecord, NewFileRecord, ObjectMeta, ObjectStore, StorageIdentity, StoredObject};
use tracing::{debug, info, warn};

use crate::arena::{Arena, ArenaScope};
use crate::error::{Error, Result};
use crate::jobs::{JobRegistry, UploadStage};
use crate::media::{MediaInfo, MediaProcessor, TranscodeParams};
use crate::progress::{ProgressSink, ProgressTracker};

/// Per-request processing options.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub generate_thumbnail: bool,
    pub process_video: bool,
    pub target_resolution: Option<String>,
    pub target_bitrate: Option<String>,
    pub target_frame_rate: Option<u32>,
}

/// Caller-supplied file metadata.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub name: String,
    pub content_type: String,
    pub owner_id: String,
    pub is_public: bool,
    pub folder_id: Option<String>,
    pub description: Option<String>,
}

/// Pipeline tuning, derived from the `[upload]` config section.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_threshold: u64,
    pub chunk_size: usize,
    pub progress_cadence: Duration,
    pub thumbnail_offset_secs: f64,
    pub transfer_retry_attempts: u32,
}

/// Ingestion pipeline over the pool, provider, catalog, and media tools.
pub struct Ingestor {
    pool: Arc<AccountPool>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    jobs: Arc<JobRegistry>,
    media: Arc<dyn MediaProcessor>,
    arena: Arena,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        pool: Arc<AccountPool>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        jobs: Arc<JobRegistry>,
        media: Arc<dyn MediaProcessor>,
        arena: Arena,
        settings: IngestSettings,
    ) -> Self {
        Self {
            pool,
            store,
            catalog,
            jobs,
            media,
            arena,
            settings,
        }
    }

    /// Run one job to completion.
    ///
    /// Stage machine: initializing → analyzing (video) → generating_thumbnail
    /// (optional) → processing_video (optional) → uploading → completed.
    /// Cancellation is detected at stage boundaries; a cancelled job stops
    /// without a provider call and leaves no arena residue.
    pub async fn ingest(
        &self,
        job_id: &str,
        payload: Bytes,
        meta: FileMeta,
        options: IngestOptions,
        progress: Option<ProgressSink>,
    ) -> Result<CatalogRecord> {
        let started = Instant::now();
        let scope = self.arena.scope(job_id).await?;

        match self
            .run_stages(job_id, payload, &meta, &options, &scope, progress)
            .await
        {
            Ok(staged) => match self.settle_success(job_id, &meta, &staged).await {
                Ok(record) => {
                    crate::metrics::record_upload(
                        "completed",
                        staged.stored.size,
                        started.elapsed().as_secs_f64(),
                    );
                    info!(
                        job_id,
                        file_id = %record.file_id,
                        account = %staged.stored.account_name,
                        size = %common::format_size(staged.stored.size),
                        "upload completed"
                    );
                    scope.purge().await;
                    Ok(record)
                }
                Err(e) => {
                    self.jobs.fail(job_id, &e.to_string()).await;
                    crate::metrics::record_upload("failed", 0, started.elapsed().as_secs_f64());
                    warn!(job_id, error = %e, "upload stored but could not be cataloged");
                    scope.purge().await;
                    Err(e)
                }
            },
            Err(StageError::Cancelled) => {
                crate::metrics::record_upload("cancelled", 0, started.elapsed().as_secs_f64());
                debug!(job_id, "upload cancelled");
                scope.purge().await;
                Err(Error::NotFound(format!("job {job_id}")))
            }
            Err(StageError::Failed(e)) => {
                self.jobs.fail(job_id, &e.to_string()).await;
                crate::metrics::record_upload("failed", 0, started.elapsed().as_secs_f64());
                warn!(job_id, error = %e, "upload failed");
                scope.purge().await;
                Err(e)
            }
        }
    }

    /// Create the catalog record, bump the owner's storage counter, and mark
    /// the job completed. Probed media attributes and the thumbnail link
    /// ride on the record.
    async fn settle_success(
        &self,
        job_id: &str,
        meta: &FileMeta,
        staged: &StagedUpload,
    ) -> Result<CatalogRecord> {
        let stored = &staged.stored;
        let record = self
            .catalog
            .create_record(NewFileRecord {
                object_id: stored.object_id.clone(),
                account_name: stored.account_name.clone(),
                owner_id: meta.owner_id.clone(),
                name: meta.name.clone(),
                content_type: meta.content_type.clone(),
                size: stored.size,
                is_public: meta.is_public,
                folder_id: meta.folder_id.clone(),
                description: meta.description.clone(),
                content_link: stored.content_link.clone(),
                media: staged.media.clone().into(),
                thumbnail_link: staged
                    .thumbnail
                    .as_ref()
                    .map(|t| t.content_link.clone()),
            })
            .await?;
        self.catalog
            .add_storage_used(&meta.owner_id, stored.size)
            .await?;
        self.jobs.complete(job_id, &record.file_id).await;
        Ok(record)
    }

    async fn run_stages(
        &self,
        job_id: &str,
        payload: Bytes,
        meta: &FileMeta,
        options: &IngestOptions,
        scope: &ArenaScope,
        progress: Option<ProgressSink>,
    ) -> std::result::Result<StagedUpload, StageError> {
        let staged = scope.artifact("payload");
        tokio::fs::write(&staged, &payload)
            .await
            .map_err(|e| StageError::Failed(e.into()))?;
        drop(payload);
        self.ensure_live(job_id).await?;

        let is_video = meta.content_type.starts_with("video/");

        // Probe failure never aborts the job; the fields just stay unset
        let media_info = if is_video {
            self.jobs.set_stage(job_id, UploadStage::Analyzing).await;
            match self.media.probe(&staged).await {
                Ok(info) => {
                    debug!(job_id, ?info, "media probe");
                    info
                }
                Err(e) => {
                    warn!(job_id, error = %e, "media probe failed, continuing without metadata");
                    MediaInfo::default()
                }
            }
        } else {
            MediaInfo::default()
        };
        self.ensure_live(job_id).await?;

        let thumbnail = if is_video && options.generate_thumbnail {
            self.jobs
                .set_stage(job_id, UploadStage::GeneratingThumbnail)
                .await;
            let thumbnail = self.generate_thumbnail(job_id, meta, scope, &staged).await;
            self.ensure_live(job_id).await?;
            thumbnail
        } else {
            None
        };

        // Transcode failure is fatal: the caller asked for specific output
        // parameters, so falling back to the original would be a silent lie
        let upload_path = if is_video && options.process_video {
            self.jobs
                .set_stage(job_id, UploadStage::ProcessingVideo)
                .await;
            let transcoded = scope.artifact("transcoded");
            let params = TranscodeParams {
                resolution: options.target_resolution.clone(),
                bitrate: options.target_bitrate.clone(),
                frame_rate: options.target_frame_rate,
            };
            self.media
                .transcode(&staged, &transcoded, &params)
                .await
                .map_err(|e| StageError::Failed(Error::Transcode(e.to_string())))?;
            if let Some(duration) = media_info.duration_secs {
                debug!(job_id, duration, "transcode finished");
            }
            transcoded
        } else {
            staged
        };
        self.ensure_live(job_id).await?;

        let data = Bytes::from(
            tokio::fs::read(&upload_path)
                .await
                .map_err(|e| StageError::Failed(e.into()))?,
        );
        let size = data.len() as u64;

        self.jobs.set_stage(job_id, UploadStage::Uploading).await;
        let mut selection = self
            .pool
            .select_account(size)
            .await
            .map_err(|e| StageError::Failed(e.into()))?;
        self.jobs
            .set_account(job_id, &selection.identity.account_name)
            .await;

        let object_meta = ObjectMeta {
            name: meta.name.clone(),
            content_type: meta.content_type.clone(),
            size,
            description: meta.description.clone(),
            parent: meta.folder_id.clone(),
        };

        // Bounded retry: each failure is recorded against the account that
        // served it, then a fresh selection takes the next attempt
        let mut attempts_left = self.settings.transfer_retry_attempts;
        let stored = loop {
            let attempt_started = Instant::now();
            match self
                .transfer(job_id, &selection.identity, &object_meta, &data, &progress)
                .await
            {
                Ok(stored) => {
                    self.pool
                        .record_success(
                            selection,
                            stored.size,
                            attempt_started.elapsed().as_secs_f64() * 1000.0,
                        )
                        .await;
                    break stored;
                }
                Err(e) => {
                    let account = selection.identity.account_name.clone();
                    self.pool.record_error(selection, &e.to_string()).await;
                    if attempts_left == 0 {
                        return Err(StageError::Failed(e.into()));
                    }
                    attempts_left -= 1;
                    warn!(job_id, account = %account, error = %e, "transfer failed, retrying on a fresh account");
                    selection = self
                        .pool
                        .select_account(size)
                        .await
                        .map_err(|err| StageError::Failed(err.into()))?;
                    self.jobs
                        .set_account(job_id, &selection.identity.account_name)
                        .await;
                }
            }
        };

        Ok(StagedUpload {
            stored,
            media: media_info,
            thumbnail,
        })
    }

    /// Move the payload to the provider: single-shot below the chunk
    /// threshold, chunked session above it. Progress lands on the job
    /// registry and the caller's sink at the configured cadence, plus one
    /// final 100% report.
    async fn transfer(
        &self,
        job_id: &str,
        identity: &StorageIdentity,
        object_meta: &ObjectMeta,
        data: &Bytes,
        progress: &Option<ProgressSink>,
    ) -> provider::Result<StoredObject> {
        let size = data.len() as u64;
        let mut tracker = ProgressTracker::new(size, self.settings.progress_cadence);

        let stored = if size <= self.settings.chunk_threshold {
            self.store
                .put_object(identity, object_meta, data.clone())
                .await?
        } else {
            let mut session = self.store.begin_upload(identity, object_meta).await?;
            let mut sent: u64 = 0;
            for chunk in data.chunks(self.settings.chunk_size) {
                session.put_chunk(Bytes::copy_from_slice(chunk)).await?;
                sent += chunk.len() as u64;
                if let Some(report) = tracker.offer(sent) {
                    self.jobs.set_progress(job_id, report.percent).await;
                    if let Some(sink) = progress {
                        sink(report);
                    }
                }
            }
            session.finish().await?
        };

        let report = tracker.finish(size);
        self.jobs.set_progress(job_id, report.percent).await;
        if let Some(sink) = progress {
            sink(report);
        }
        Ok(stored)
    }

    /// Thumbnail generation and its upload are best-effort; any failure is
    /// logged and the job moves on without one. On success the stored
    /// thumbnail is returned so its reference can ride on the file record.
    async fn generate_thumbnail(
        &self,
        job_id: &str,
        meta: &FileMeta,
        scope: &ArenaScope,
        staged: &std::path::Path,
    ) -> Option<StoredObject> {
        let thumb_path = scope.artifact("thumbnail.jpg");
        if let Err(e) = self
            .media
            .thumbnail(staged, &thumb_path, self.settings.thumbnail_offset_secs)
            .await
        {
            warn!(job_id, error = %e, "thumbnail generation failed, skipping");
            return None;
        }

        let bytes = match tokio::fs::read(&thumb_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(job_id, error = %e, "thumbnail unreadable, skipping");
                return None;
            }
        };

        let selection = match self.pool.select_account(bytes.len() as u64).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!(job_id, error = %e, "no account for thumbnail, skipping");
                return None;
            }
        };
        let thumb_meta = ObjectMeta {
            name: format!("{}.thumb.jpg", meta.name),
            content_type: "image/jpeg".to_string(),
            size: bytes.len() as u64,
            description: None,
            parent: meta.folder_id.clone(),
        };
        let started = Instant::now();
        match self
            .store
            .put_object(&selection.identity, &thumb_meta, bytes)
            .await
        {
            Ok(stored) => {
                self.pool
                    .record_success(
                        selection,
                        stored.size,
                        started.elapsed().as_secs_f64() * 1000.0,
                    )
                    .await;
                debug!(job_id, object_id = %stored.object_id, "thumbnail uploaded");
                Some(stored)
            }
            Err(e) => {
                self.pool.record_error(selection, &e.to_string()).await;
                warn!(job_id, error = %e, "thumbnail upload failed, skipping");
                None
            }
        }
    }

    async fn ensure_live(&self, job_id: &str) -> std::result::Result<(), StageError> {
        if self.jobs.exists(job_id).await {
            Ok(())
        } else {
            Err(StageError::Cancelled)
        }
    }
}

/// Everything the stage run hands to settlement: the stored object plus
/// whatever the media stages derived along the way.
struct StagedUpload {
    stored: StoredObject,
    media: MediaInfo,
    thumbnail: Option<StoredObject>,
}

/// Internal stage outcome; cancellation is not an error against any account.
enum StageError {
    Cancelled,
    Failed(Error),
}
