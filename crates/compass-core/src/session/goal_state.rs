//! Explicit goal lifecycle state.

use serde::{Deserialize, Serialize};

/// Where a session stands in the goal lifecycle.
///
/// This is an explicit, persisted field. Earlier revisions of the system
/// inferred the state from message counts in the history, which broke as soon
/// as a turn was rolled back; every gate now reads this enum instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// No goal has been submitted yet.
    Absent,
    /// A goal exists but has not been clarified.
    Draft,
    /// The goal has been clarified; personalised content is final.
    Clarified,
}

impl GoalState {
    /// Whether a clarify turn is currently permitted.
    ///
    /// Clarification needs an existing goal that has not already been
    /// clarified.
    pub fn allows_clarification(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Whether chat turns are permitted (any state with a goal).
    pub fn allows_chat(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl Default for GoalState {
    fn default() -> Self {
        Self::Absent
    }
}

impl std::fmt::Display for GoalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Draft => write!(f, "draft"),
            Self::Clarified => write!(f, "clarified"),
        }
    }
}
