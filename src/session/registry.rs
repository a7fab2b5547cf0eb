//! Concurrency-safe registry of live sessions.
//!
//! Used for introspection (live count, per-session summaries) and for
//! the coordinated shutdown sweep: every session's cancel token is
//! triggered before the listening socket closes, so each session runs
//! its teardown, final usage checkpoint included, exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub principal_id: String,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Introspection view of one live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub principal_id: String,
    pub started_at: DateTime<Utc>,
    pub connected_secs: f64,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: Uuid, entry: SessionEntry) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, entry);
    }

    pub async fn remove(&self, session_id: &Uuid) -> Option<SessionEntry> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, entry)| SessionSummary {
                session_id: id.to_string(),
                principal_id: entry.principal_id.clone(),
                started_at: entry.started_at,
                connected_secs: (now - entry.started_at).num_milliseconds() as f64 / 1000.0,
            })
            .collect()
    }

    /// Request termination of every live session. Sessions observe their
    /// token, run teardown, and deregister themselves.
    pub async fn shutdown_all(&self) {
        let sessions = self.sessions.read().await;
        for entry in sessions.values() {
            entry.cancel.cancel();
        }
    }
}
