//! Turn model: one request/response exchange within a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of interaction a turn performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Submit a raw goal statement.
    Goal,
    /// Answer the clarification question for an existing goal.
    Clarify,
    /// Free-form chat against the session context.
    Chat,
}

impl std::fmt::Display for TurnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Goal => write!(f, "goal"),
            Self::Clarify => write!(f, "clarify"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

/// One request/response exchange.
///
/// A turn is created when orchestration starts; only its messages survive it,
/// and only when the whole pipeline succeeds.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Unique turn identifier; every persisted message carries it.
    pub id: String,
    pub kind: TurnKind,
    /// The user-supplied input that started this turn.
    pub input: String,
}

impl Turn {
    /// Starts a new turn with a fresh UUID.
    pub fn new(kind: TurnKind, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            input: input.into(),
        }
    }
}

/// Pipeline stage a turn is in, used for rollback forensics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Received,
    CallingUpstream,
    Validating,
    Persisting,
    Done,
    RolledBack,
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::CallingUpstream => write!(f, "calling_upstream"),
            Self::Validating => write!(f, "validating"),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}
