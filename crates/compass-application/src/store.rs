//! In-memory store implementations.
//!
//! Default backends for single-process deployments and tests. Durable
//! backends implement the same `compass-core` traits.

use async_trait::async_trait;
use compass_core::error::Result;
use compass_core::session::{ConversationMessage, HistoryStore, Session, SessionRepository};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Message log held in process memory, keyed by session id.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    logs: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(
        &self,
        session_id: &str,
        _turn_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        let mut logs = self.logs.write().await;
        logs.entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn rollback(&self, session_id: &str, turn_id: &str) -> Result<usize> {
        let mut logs = self.logs.write().await;
        let Some(log) = logs.get_mut(session_id) else {
            return Ok(0);
        };
        let before = log.len();
        log.retain(|message| message.turn_id != turn_id);
        Ok(before - log.len())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let logs = self.logs.read().await;
        Ok(logs.get(session_id).cloned().unwrap_or_default())
    }
}

/// Session records held in process memory.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().cloned().collect())
    }
}
