//! Stream session registry

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::debug;

use crate::range::RangeSpec;

/// One live read of a stored object.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub id: String,
    pub file_id: String,
    /// Resolved range; `None` for a full-body read.
    pub range: Option<RangeSpec>,
    pub account_name: String,
    pub started_at: Instant,
}

/// Registry of in-flight stream sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, StreamSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        file_id: &str,
        range: Option<RangeSpec>,
        account_name: &str,
    ) -> String {
        let id = format!("stream_{}", uuid::Uuid::new_v4().as_simple());
        let session = StreamSession {
            id: id.clone(),
            file_id: file_id.to_string(),
            range,
            account_name: account_name.to_string(),
            started_at: Instant::now(),
        };
        self.sessions.write().await.insert(id.clone(), session);
        debug!(session_id = %id, file_id, account = account_name, "stream session opened");
        id
    }

    /// Remove a finished session. Returns it for the caller's logging.
    pub async fn finish(&self, id: &str) -> Option<StreamSession> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            debug!(session_id = %id, "stream session closed");
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<StreamSession> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_finish() {
        let registry = SessionRegistry::new();
        let id = registry
            .register(
                "file-1",
                Some(RangeSpec {
                    start: 0,
                    end: 99,
                    content_length: 100,
                }),
                "acct-1",
            )
            .await;

        assert_eq!(registry.active_count().await, 1);
        let session = registry.get(&id).await.unwrap();
        assert_eq!(session.file_id, "file-1");
        assert_eq!(session.range.unwrap().content_length, 100);

        let finished = registry.finish(&id).await.unwrap();
        assert_eq!(finished.account_name, "acct-1");
        assert_eq!(registry.active_count().await, 0);
        assert!(registry.finish(&id).await.is_none());
    }

    #[tokio::test]
    async fn full_body_session_has_no_range() {
        let registry = SessionRegistry::new();
        let id = registry.register("file-1", None, "acct-1").await;
        assert!(registry.get(&id).await.unwrap().range.is_none());
    }
}
