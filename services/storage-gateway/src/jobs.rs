//! Upload job registry and stage machine

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

/// Stages of an ingestion job.
///
/// Transitions run left to right; `Failed` and `Cancelled` can be entered
/// from any non-terminal stage. `Analyzing`, `GeneratingThumbnail`, and
/// `ProcessingVideo` only occur for video payloads with the matching option
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Initializing,
    Analyzing,
    GeneratingThumbnail,
    ProcessingVideo,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStage {
    pub fn label(&self) -> &'static str {
        match self {
            UploadStage::Initializing => "initializing",
            UploadStage::Analyzing => "analyzing",
            UploadStage::GeneratingThumbnail => "generating_thumbnail",
            UploadStage::ProcessingVideo => "processing_video",
            UploadStage::Uploading => "uploading",
            UploadStage::Completed => "completed",
            UploadStage::Failed => "failed",
            UploadStage::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStage::Completed | UploadStage::Failed | UploadStage::Cancelled
        )
    }
}

/// Observable state of one ingestion job.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: String,
    pub original_name: String,
    pub declared_size: u64,
    pub stage: UploadStage,
    /// Transfer percent in [0, 100].
    pub progress: f64,
    pub account_name: Option<String>,
    pub file_id: Option<String>,
    pub error: Option<String>,
}

/// Registry of in-flight and recently finished jobs.
///
/// Cancellation removes the entry outright; the pipeline detects the
/// missing entry between stages and stops, and status queries report
/// not-found from that point on.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, UploadJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the `Initializing` stage; returns its id.
    pub async fn create(&self, original_name: &str, declared_size: u64) -> String {
        let id = format!("job_{}", uuid::Uuid::new_v4().as_simple());
        let job = UploadJob {
            id: id.clone(),
            original_name: original_name.to_string(),
            declared_size,
            stage: UploadStage::Initializing,
            progress: 0.0,
            account_name: None,
            file_id: None,
            error: None,
        };
        self.jobs.write().await.insert(id.clone(), job);
        debug!(job_id = %id, original_name, declared_size, "job registered");
        id
    }

    pub async fn status(&self, id: &str) -> Option<UploadJob> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Whether the job still exists (false after cancellation).
    pub async fn exists(&self, id: &str) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    pub async fn set_stage(&self, id: &str, stage: UploadStage) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            debug!(job_id = %id, stage = stage.label(), "job stage");
            job.stage = stage;
        }
    }

    pub async fn set_progress(&self, id: &str, percent: f64) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.progress = percent.clamp(0.0, 100.0);
        }
    }

    pub async fn set_account(&self, id: &str, account_name: &str) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.account_name = Some(account_name.to_string());
        }
    }

    pub async fn complete(&self, id: &str, file_id: &str) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.stage = UploadStage::Completed;
            job.progress = 100.0;
            job.file_id = Some(file_id.to_string());
        }
    }

    pub async fn fail(&self, id: &str, error: &str) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.stage = UploadStage::Failed;
            job.error = Some(error.to_string());
        }
    }

    /// Best-effort cancel: remove the job so the pipeline stops at its next
    /// stage boundary. Returns false when the job is unknown or already
    /// terminal.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id) {
            Some(job) if !job.stage.is_terminal() => {
                jobs.remove(id);
                debug!(job_id = %id, "job cancelled");
                true
            }
            _ => false,
        }
    }

    /// Number of non-terminal jobs (health observability).
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| !j.stage.is_terminal())
            .count()
    }
}
