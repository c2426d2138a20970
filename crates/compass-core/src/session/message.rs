//! Conversation message types.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a session's durable history.
///
/// Every message is tagged with the id of the turn that produced it, so a
/// failed turn can be removed from the log as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Timestamp when the message was created (ISO 8601 format).
    pub timestamp: String,
    /// Id of the turn this message belongs to.
    pub turn_id: String,
}

impl ConversationMessage {
    /// Creates a user message stamped with the current time.
    pub fn user(content: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, turn_id)
    }

    /// Creates an assistant message stamped with the current time.
    pub fn assistant(content: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content, turn_id)
    }

    fn new(role: MessageRole, content: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            turn_id: turn_id.into(),
        }
    }
}
