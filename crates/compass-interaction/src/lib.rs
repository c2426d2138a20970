//! Upstream layer: the completion-service seam and everything that guards it.
//!
//! - [`agent`]: the `CompletionAgent` trait and its typed failure modes
//! - [`http_agent`]: reqwest-based agent for a JSON completion API
//! - [`codec`]: fenced-JSON extraction from raw model output
//! - [`resilience`]: circuit breaker and retry policy composed around agents

pub mod agent;
pub mod codec;
pub mod http_agent;
pub mod resilience;

pub use agent::{CompletionAgent, CompletionError, CompletionRequest};
pub use http_agent::HttpCompletionAgent;
pub use resilience::{BreakerConfig, CircuitBreaker, CircuitState, RetryPolicy};
