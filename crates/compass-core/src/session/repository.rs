//! Session and history persistence traits.
//!
//! Defines the interfaces the orchestration layer persists through.

use super::message::ConversationMessage;
use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for managing session persistence.
///
/// This trait defines the contract for persisting and retrieving sessions,
/// decoupling the application's core logic from the specific storage
/// mechanism (in-memory map, database, remote API).
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Saves a session to storage.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Deletes a session from storage.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists all stored sessions.
    async fn list_all(&self) -> Result<Vec<Session>>;
}

/// The durable, per-session ordered message log.
///
/// The store only ever contains messages belonging to fully committed turns;
/// the turn orchestrator enforces that by appending after validation and
/// rolling back on any later failure.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends turn-tagged messages to a session's log, in order.
    async fn append(
        &self,
        session_id: &str,
        turn_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()>;

    /// Removes every message tagged with `turn_id` from the session's log.
    ///
    /// Must be idempotent: removing a turn that never persisted anything is a
    /// no-op.
    ///
    /// # Returns
    ///
    /// The number of messages removed.
    async fn rollback(&self, session_id: &str, turn_id: &str) -> Result<usize>;

    /// Returns the session's full ordered message log.
    async fn list(&self, session_id: &str) -> Result<Vec<ConversationMessage>>;
}
