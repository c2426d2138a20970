//! Thin endpoint adapters.
//!
//! Each adapter resolves the credential to a session, maps the request body
//! to `(kind, input)`, delegates to the orchestrator, and shapes the
//! kind-specific response. HTTP frameworks mount these directly: on error,
//! serialize [`CompassError::to_envelope`] with [`CompassError::http_status`].

use crate::orchestrator::{TurnOrchestrator, TurnResult};
use compass_core::auth::Authenticator;
use compass_core::error::{CompassError, Result};
use compass_core::session::{ConversationMessage, GoalState};
use compass_core::turn::TurnKind;
use compass_core::validation::{ChatPayload, ClarifyPayload, GoalPayload, TurnPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for goal submission.
#[derive(Debug, Clone, Deserialize)]
pub struct GoalRequest {
    pub input: String,
}

/// Request body for goal clarification.
#[derive(Debug, Clone, Deserialize)]
pub struct ClarifyRequest {
    pub clarification: String,
}

/// Where the user currently is on the site.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatContext {
    pub page: String,
    pub section: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Request body for chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Option<ChatContext>,
}

/// One message as rendered to clients.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub role: String,
    pub message: String,
    pub datetime: String,
}

impl From<&ConversationMessage> for MessageView {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role.to_string(),
            message: message.content.clone(),
            datetime: message.timestamp.clone(),
        }
    }
}

/// Response for goal submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalResponse {
    pub assistant_message: MessageView,
    pub history: Vec<MessageView>,
    #[serde(flatten)]
    pub personalisation: GoalPayload,
}

/// Response for chat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(flatten)]
    pub payload: ChatPayload,
    pub history: Vec<MessageView>,
}

/// Read-only view of a session's state and committed log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub goal_state: GoalState,
    pub messages: Vec<MessageView>,
}

/// Submits a raw goal statement.
pub async fn submit_goal(
    auth: &dyn Authenticator,
    orchestrator: &TurnOrchestrator,
    credential: &str,
    request: GoalRequest,
) -> Result<GoalResponse> {
    let session_id = auth.resolve_session(credential).await?;
    let result = orchestrator
        .handle(&session_id, TurnKind::Goal, &request.input)
        .await?;

    let TurnResult {
        payload, messages, ..
    } = result;
    let TurnPayload::Goal(personalisation) = payload else {
        return Err(CompassError::internal("goal turn produced a non-goal payload"));
    };

    let assistant_message = messages
        .iter()
        .rev()
        .find(|m| m.role == compass_core::session::MessageRole::Assistant)
        .map(MessageView::from)
        .ok_or_else(|| CompassError::internal("goal turn committed no assistant message"))?;

    Ok(GoalResponse {
        assistant_message,
        history: messages.iter().map(MessageView::from).collect(),
        personalisation,
    })
}

/// Answers the clarification question for an existing goal.
pub async fn clarify_goal(
    auth: &dyn Authenticator,
    orchestrator: &TurnOrchestrator,
    credential: &str,
    request: ClarifyRequest,
) -> Result<ClarifyPayload> {
    let session_id = auth.resolve_session(credential).await?;
    let result = orchestrator
        .handle(&session_id, TurnKind::Clarify, &request.clarification)
        .await?;

    match result.payload {
        TurnPayload::Clarify(payload) => Ok(payload),
        _ => Err(CompassError::internal(
            "clarify turn produced a non-clarify payload",
        )),
    }
}

/// Continues the contextual conversation.
pub async fn chat(
    auth: &dyn Authenticator,
    orchestrator: &TurnOrchestrator,
    credential: &str,
    request: ChatRequest,
) -> Result<ChatResponse> {
    let session_id = auth.resolve_session(credential).await?;
    let result = orchestrator
        .handle(&session_id, TurnKind::Chat, &request.message)
        .await?;

    let TurnPayload::Chat(payload) = result.payload else {
        return Err(CompassError::internal("chat turn produced a non-chat payload"));
    };

    let log = orchestrator.session_snapshot(&session_id).await?.1;
    Ok(ChatResponse {
        payload,
        history: log.iter().map(MessageView::from).collect(),
    })
}

/// Hydrates the session: goal state plus the committed message log.
pub async fn session_snapshot(
    auth: &dyn Authenticator,
    orchestrator: &TurnOrchestrator,
    credential: &str,
) -> Result<SessionSnapshot> {
    let session_id = auth.resolve_session(credential).await?;
    let (session, messages) = orchestrator.session_snapshot(&session_id).await?;
    Ok(SessionSnapshot {
        session_id: session.id,
        goal_state: session.goal_state,
        messages: messages.iter().map(MessageView::from).collect(),
    })
}
