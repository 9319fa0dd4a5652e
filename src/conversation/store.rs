//! Per-session conversation logs

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::{ConversationLog, WindowPolicy};

/// A session's log, locked for the duration of a relay turn
pub type SharedLog = Arc<Mutex<ConversationLog>>;

/// Conversation logs keyed by session ID
///
/// Each transcript connection owns one log from open to close, so concurrent
/// users never observe each other's dialogue.
pub struct SessionStore {
    system_prompt: String,
    policy: WindowPolicy,
    sessions: RwLock<HashMap<String, SharedLog>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, policy: WindowPolicy) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            policy,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the log for a session, creating a fresh one if needed
    pub async fn open(&self, session_id: &str) -> SharedLog {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "conversation opened");
                Arc::new(Mutex::new(ConversationLog::new(
                    self.system_prompt.clone(),
                    self.policy,
                )))
            })
            .clone()
    }

    /// Drop a session's log, returning whether it existed
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::debug!(session_id, "conversation closed");
        }
        removed
    }

    /// Number of open sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
