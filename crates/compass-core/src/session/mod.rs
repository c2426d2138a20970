//! Session domain module.
//!
//! This module contains the session-related domain models and the
//! repository interfaces the orchestration layer persists through.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`)
//! - `goal_state`: Explicit goal lifecycle state (`GoalState`)
//! - `message`: Conversation message types (`MessageRole`, `ConversationMessage`)
//! - `repository`: Repository traits for session and history persistence

mod goal_state;
mod message;
mod model;
mod repository;

// Re-export public API
pub use goal_state::GoalState;
pub use message::{ConversationMessage, MessageRole};
pub use model::Session;
pub use repository::{HistoryStore, SessionRepository};
