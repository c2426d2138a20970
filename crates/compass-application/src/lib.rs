//! Application layer: the turn orchestration façade.
//!
//! This crate wires the domain (`compass-core`) to the upstream layer
//! (`compass-interaction`): the [`orchestrator::TurnOrchestrator`] drives
//! retry → completion → validation → history for every turn, and
//! [`history::HistoryManager`] enforces the append/rollback contract that
//! keeps the durable log free of half-committed turns.

pub mod endpoints;
pub mod history;
pub mod orchestrator;
pub mod store;

pub use history::HistoryManager;
pub use orchestrator::{TurnOrchestrator, TurnResult};
pub use store::{InMemoryHistoryStore, InMemorySessionRepository};
