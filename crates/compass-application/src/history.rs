//! History persistence with rollback support.

use compass_core::error::{CompassError, Result};
use compass_core::session::{ConversationMessage, HistoryStore};
use compass_core::turn::TurnStage;
use std::sync::Arc;

/// Enforces the append-then-confirm / rollback-on-failure contract over a
/// session's message log.
///
/// Only the turn orchestrator calls into this type. `append` runs strictly
/// after validation; `rollback` runs on any later failure and is a no-op when
/// the turn never persisted anything.
#[derive(Clone)]
pub struct HistoryManager {
    store: Arc<dyn HistoryStore>,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Persists a turn's messages, in order.
    pub async fn append(
        &self,
        session_id: &str,
        turn_id: &str,
        messages: &[ConversationMessage],
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        self.store.append(session_id, turn_id, messages).await?;
        tracing::debug!(
            session_id,
            turn_id,
            count = messages.len(),
            "turn messages appended"
        );
        Ok(())
    }

    /// Removes everything the failed turn persisted.
    ///
    /// Both the attempt and its outcome are logged with enough context to
    /// reconstruct the failure afterwards. A rollback failure is logged loudly
    /// but does not replace `cause` as the reported error.
    pub async fn rollback(
        &self,
        session_id: &str,
        turn_id: &str,
        stage: TurnStage,
        cause: &CompassError,
    ) {
        tracing::warn!(
            session_id,
            turn_id,
            stage = %stage,
            cause = %cause,
            "rolling back turn history"
        );

        match self.store.rollback(session_id, turn_id).await {
            Ok(removed) => {
                tracing::info!(
                    session_id,
                    turn_id,
                    stage = %TurnStage::RolledBack,
                    removed,
                    "turn history rolled back"
                );
            }
            Err(err) => {
                tracing::error!(
                    session_id,
                    turn_id,
                    error = %err,
                    "rollback failed; session log may need manual cleanup"
                );
            }
        }
    }

    /// Returns the session's committed message log.
    pub async fn list(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        self.store.list(session_id).await
    }
}
