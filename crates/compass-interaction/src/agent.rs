//! Completion-service seam.

use async_trait::async_trait;
use compass_core::session::ConversationMessage;
use compass_core::turn::TurnKind;
use std::time::Duration;
use thiserror::Error;

/// One invocation of the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub kind: TurnKind,
    pub session_id: String,
    /// The user-supplied input for this turn.
    pub input: String,
    /// Committed session history, oldest first.
    pub history: Vec<ConversationMessage>,
    /// Hard deadline for this single call; expiry is a transient failure.
    pub timeout: Duration,
}

/// Typed failure from the completion service.
///
/// The retry layer keys off [`CompletionError::is_retryable`]: timeouts and
/// transient 5xx-class failures are worth more attempts, terminal rejections
/// are not.
#[derive(Debug, Error, Clone)]
pub enum CompletionError {
    /// The call did not complete within its deadline.
    #[error("completion request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Transient failure (connect error, 429/5xx) worth retrying.
    #[error("transient completion failure: {message}")]
    Transient {
        status_code: Option<u16>,
        message: String,
        /// Server-suggested delay, if it sent one.
        retry_after: Option<Duration>,
    },

    /// Terminal rejection (bad request, auth, unsupported input).
    #[error("completion service rejected the request: {message}")]
    Terminal {
        status_code: Option<u16>,
        message: String,
    },
}

impl CompletionError {
    /// Whether the retry policy may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient { .. })
    }
}

/// An agent that turns a [`CompletionRequest`] into raw model output.
///
/// Implementations must honor `request.timeout` and report expiry as
/// [`CompletionError::Timeout`].
#[async_trait]
pub trait CompletionAgent: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
