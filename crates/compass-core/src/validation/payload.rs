//! Typed completion payloads, decoded after validation passes.

use crate::catalog::CaseStudy;
use crate::error::{CompassError, Result, RetryAction};
use crate::turn::TurnKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mission proposed to the user, worth a positive number of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    pub points: i64,
}

/// Headline block of a personalised pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
    pub title: String,
    pub description: String,
}

/// One step of the proposed delivery process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Frontend routing instruction attached to a chat reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub page: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Validated output of a goal turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPayload {
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub case_studies: Vec<CaseStudy>,
}

/// Validated output of a clarify turn: the full personalised pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyPayload {
    pub hero: Hero,
    pub process: Vec<ProcessStep>,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub case_studies: Vec<CaseStudy>,
    #[serde(default)]
    pub why: String,
    pub missions: Vec<Mission>,
}

/// Validated output of a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_missions: Option<Vec<Mission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate: Option<Navigation>,
}

/// Kind-specific payload returned by a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TurnPayload {
    Goal(GoalPayload),
    Clarify(ClarifyPayload),
    Chat(ChatPayload),
}

impl TurnPayload {
    /// The turn kind this payload belongs to.
    pub fn kind(&self) -> TurnKind {
        match self {
            Self::Goal(_) => TurnKind::Goal,
            Self::Clarify(_) => TurnKind::Clarify,
            Self::Chat(_) => TurnKind::Chat,
        }
    }

    /// Decodes a validated JSON value into the typed payload for `kind`.
    ///
    /// Validation runs first, so a decode failure here means the output was
    /// still malformed in a way worth one more upstream attempt.
    pub fn decode(kind: TurnKind, value: Value) -> Result<Self> {
        let mapped = |err: serde_json::Error| {
            CompassError::validation(
                format!("{kind}_malformed_output"),
                format!("Completion output did not match the {kind} schema: {err}"),
                RetryAction::Retry,
            )
        };
        match kind {
            TurnKind::Goal => Ok(Self::Goal(serde_json::from_value(value).map_err(mapped)?)),
            TurnKind::Clarify => Ok(Self::Clarify(
                serde_json::from_value(value).map_err(mapped)?,
            )),
            TurnKind::Chat => Ok(Self::Chat(serde_json::from_value(value).map_err(mapped)?)),
        }
    }
}
