//! Temporary resource arena
//!
//! Every ingestion job stages its intermediate artifacts (payload, thumbnail,
//! transcode output) inside one per-job directory under a shared root. The
//! scope removes its directory when it goes out of use, whether the job
//! succeeded, failed, or was cancelled.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Root of the temp-file arena.
#[derive(Debug, Clone)]
pub struct Arena {
    root: PathBuf,
}

impl Arena {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Acquire a scope owning the per-job subdirectory `root/<job_id>`.
    pub async fn scope(&self, job_id: &str) -> std::io::Result<ArenaScope> {
        let dir = self.root.join(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "arena scope acquired");
        Ok(ArenaScope { dir, purged: false })
    }
}

/// Owned per-job directory. Removed on drop; `purge()` removes it eagerly
/// without blocking the async runtime.
#[derive(Debug)]
pub struct ArenaScope {
    dir: PathBuf,
    purged: bool,
}

impl ArenaScope {
    /// The scope's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a named artifact inside the scope.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn purge(mut self) {
        self.purged = true;
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(dir = %self.dir.display(), error = %e, "arena purge failed");
        }
    }
}

impl Drop for ArenaScope {
    fn drop(&mut self) {
        if self.purged {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(dir = %self.dir.display(), error = %e, "arena cleanup on drop failed");
        }
    }
}
