//! Per-session conversation history.

use docchat_core::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Handle to one session's message log.
///
/// Clones share the same log. A handle taken before the session was cleared
/// keeps pointing at the old, detached log.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl SessionHistory {
    /// Snapshot of the log, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    /// Number of messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Append one message.
    pub async fn push(&self, message: Message) {
        self.messages.write().await.push(message);
    }

    /// Append a question and its answer under a single lock acquisition.
    pub async fn append_turn(&self, question: impl Into<String>, answer: impl Into<String>) {
        let mut messages = self.messages.write().await;
        messages.push(Message::Human(question.into()));
        messages.push(Message::Assistant(answer.into()));
    }
}

/// Session id -> history, shared by every conversation in the process.
///
/// Sessions are created on first use and live until cleared.
#[derive(Debug, Default)]
pub struct HistoryStore {
    sessions: RwLock<HashMap<String, SessionHistory>>,
}

impl HistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the history for `session_id`, creating it if needed.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHistory {
        if let Some(history) = self.sessions.read().await.get(session_id) {
            return history.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Created session {}", session_id);
                SessionHistory::default()
            })
            .clone()
    }

    /// Messages of `session_id`. Unknown sessions read as empty and are not created.
    pub async fn messages(&self, session_id: &str) -> Vec<Message> {
        let history = self.sessions.read().await.get(session_id).cloned();
        match history {
            Some(history) => history.messages().await,
            None => Vec::new(),
        }
    }

    /// Forget a session. Clearing an unknown session does nothing.
    pub async fn clear(&self, session_id: &str) {
        if self.sessions.write().await.remove(session_id).is_some() {
            debug!("Cleared session {}", session_id);
        }
    }

    /// Known session ids, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session exists.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
