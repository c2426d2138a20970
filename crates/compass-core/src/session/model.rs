//! Session domain model.

use super::goal_state::GoalState;
use serde::{Deserialize, Serialize};

/// Represents a user session in the application's domain layer.
///
/// A session owns an ordered message log (persisted through
/// [`super::HistoryStore`]) and an explicit goal lifecycle state. Progress
/// tracking (points, completed missions) is owned elsewhere.
///
/// This is the "pure" domain model that business logic operates on,
/// independent of any specific storage format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Where this session stands in the goal lifecycle.
    #[serde(default)]
    pub goal_state: GoalState,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
}

impl Session {
    /// Creates a fresh session with no goal.
    pub fn new(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            goal_state: GoalState::Absent,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Refreshes the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
