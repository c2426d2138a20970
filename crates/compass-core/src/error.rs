//! Error types for the Compass orchestration core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable guidance for the caller after a failed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// The failure is terminal; repeating the request will not help.
    None,
    /// The request may be retried immediately (e.g. truncated model output).
    Retry,
    /// The request should be retried after a delay (upstream pressure).
    Backoff,
    /// The failure needs human intervention.
    ContactSupport,
}

impl std::fmt::Display for RetryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Retry => write!(f, "retry"),
            Self::Backoff => write!(f, "backoff"),
            Self::ContactSupport => write!(f, "contact_support"),
        }
    }
}

/// The uniform wire shape for every reported failure.
///
/// This is returned verbatim to the caller; HTTP adapters pair it with
/// [`CompassError::http_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always `true`; lets clients discriminate error payloads cheaply.
    pub error: bool,
    pub message: String,
    pub retry_action: RetryAction,
    pub error_code: String,
}

/// A shared error type for the Compass application.
///
/// Internal components raise the narrowest variant that applies; the turn
/// orchestrator is the single place where these are translated into an
/// [`ErrorEnvelope`] for the caller.
#[derive(Error, Debug, Clone, Serialize)]
pub enum CompassError {
    /// The request could not be resolved to a session (401-class).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Completion output (or caller input) failed a structural or semantic check.
    #[error("Validation failed ({code}): {message}")]
    Validation {
        code: String,
        message: String,
        retry_action: RetryAction,
    },

    /// The session is not in a state that permits the requested turn.
    #[error("State conflict ({code}): {message}")]
    StateConflict { code: String, message: String },

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Transient upstream failure (timeout, 5xx) that survived the retry budget.
    #[error("Upstream failure: {message}")]
    UpstreamTransient { message: String },

    /// The circuit breaker is open; retry after the cooldown elapses.
    #[error("Upstream unavailable, retry after {retry_after_secs:.2}s")]
    UpstreamUnavailable { retry_after_secs: f64 },

    /// The history store failed; the turn has been rolled back.
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompassError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates an Authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates a Validation error with an explicit retry action
    pub fn validation(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_action: RetryAction,
    ) -> Self {
        Self::Validation {
            code: code.into(),
            message: message.into(),
            retry_action,
        }
    }

    /// Creates a StateConflict error
    pub fn state_conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateConflict {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this is a StateConflict error
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }

    /// Check if the caller may usefully retry this turn, immediately or after
    /// a delay.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.retry_action(), RetryAction::None)
    }

    /// The retry guidance reported for this error.
    pub fn retry_action(&self) -> RetryAction {
        match self {
            Self::Authentication { .. } => RetryAction::None,
            Self::Validation { retry_action, .. } => *retry_action,
            Self::StateConflict { .. } => RetryAction::None,
            Self::NotFound { .. } => RetryAction::None,
            Self::UpstreamTransient { .. } => RetryAction::Backoff,
            Self::UpstreamUnavailable { .. } => RetryAction::Backoff,
            Self::Persistence { .. } => RetryAction::Retry,
            Self::Internal(_) => RetryAction::ContactSupport,
        }
    }

    /// The stable machine-readable code reported for this error.
    pub fn error_code(&self) -> String {
        match self {
            Self::Authentication { .. } => "auth_failed".to_string(),
            Self::Validation { code, .. } => code.clone(),
            Self::StateConflict { code, .. } => code.clone(),
            Self::NotFound { entity_type, .. } => format!("{entity_type}_not_found"),
            Self::UpstreamTransient { .. } => "upstream_transient".to_string(),
            Self::UpstreamUnavailable { .. } => "upstream_unavailable".to_string(),
            Self::Persistence { .. } => "persistence_failed".to_string(),
            Self::Internal(_) => "internal_error".to_string(),
        }
    }

    /// The HTTP status an adapter should pair with this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Authentication { .. } => 401,
            Self::StateConflict { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::UpstreamTransient { .. } | Self::UpstreamUnavailable { .. } => 503,
            Self::Persistence { .. } | Self::Internal(_) => 500,
        }
    }

    /// Renders this error into the uniform wire envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: true,
            message: self.to_string(),
            retry_action: self.retry_action(),
            error_code: self.error_code(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<serde_json::Error> for CompassError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {err}"))
    }
}

/// Conversion for store implementations that surface arbitrary error chains.
impl From<anyhow::Error> for CompassError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, CompassError>`.
pub type Result<T> = std::result::Result<T, CompassError>;
