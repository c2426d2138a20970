//! Pure validation checks over decoded completion output.

use crate::catalog::CaseStudy;
use crate::error::{CompassError, Result, RetryAction};
use crate::session::GoalState;
use crate::turn::TurnKind;
use serde_json::Value;
use std::collections::HashSet;

/// Rejects empty or whitespace-only caller input before anything upstream
/// is touched.
pub fn ensure_input(kind: TurnKind, input: &str) -> Result<()> {
    if input.trim().is_empty() {
        let what = match kind {
            TurnKind::Goal => "Input",
            TurnKind::Clarify => "Clarification",
            TurnKind::Chat => "Message",
        };
        return Err(CompassError::validation(
            format!("{kind}_empty_input"),
            format!("{what} cannot be empty"),
            RetryAction::None,
        ));
    }
    Ok(())
}

/// Checks the session's explicit goal state against the requested turn kind.
///
/// This is the gate that used to be inferred from message counts; it now
/// reads [`GoalState`] directly.
pub fn ensure_turn_allowed(kind: TurnKind, state: GoalState) -> Result<()> {
    match kind {
        TurnKind::Goal => Ok(()),
        TurnKind::Clarify => match state {
            GoalState::Absent => Err(CompassError::state_conflict(
                "clarify_no_goal",
                "No goal found in session - please submit a goal first",
            )),
            GoalState::Clarified => Err(CompassError::state_conflict(
                "clarify_already_clarified",
                "Session already has a clarification - cannot clarify again",
            )),
            GoalState::Draft => Ok(()),
        },
        TurnKind::Chat => {
            if state.allows_chat() {
                Ok(())
            } else {
                Err(CompassError::state_conflict(
                    "chat_requires_goal",
                    "Session does not have a goal",
                ))
            }
        }
    }
}

/// Validates decoded completion output for the given turn kind.
pub fn validate_payload(kind: TurnKind, value: &Value) -> Result<()> {
    let body = match value.as_object() {
        Some(map) if !map.is_empty() => map,
        // Empty or non-object output looks truncated; worth another attempt.
        _ => {
            return Err(CompassError::validation(
                format!("{kind}_empty_response"),
                "Empty response from AI service",
                RetryAction::Retry,
            ));
        }
    };

    match kind {
        TurnKind::Goal => validate_goal(body),
        TurnKind::Clarify => validate_clarify(body),
        TurnKind::Chat => validate_chat(body),
    }
}

fn validate_goal(body: &serde_json::Map<String, Value>) -> Result<()> {
    if non_empty_str(body.get("headline")).is_none() {
        return Err(terminal(
            "goal_missing_headline",
            "AI response missing goal headline",
        ));
    }

    if let Some(question) = body.get("clarificationQuestion") {
        if non_empty_str(Some(question)).is_none() {
            return Err(terminal(
                "goal_invalid_clarification",
                "AI response contains an empty clarification question",
            ));
        }
    }

    if let Some(missions) = body.get("missions") {
        validate_missions(TurnKind::Goal, missions, false)?;
    }

    Ok(())
}

fn validate_clarify(body: &serde_json::Map<String, Value>) -> Result<()> {
    let hero = body.get("hero").and_then(Value::as_object);
    let hero_ok = hero.is_some_and(|h| {
        non_empty_str(h.get("title")).is_some() && non_empty_str(h.get("description")).is_some()
    });
    if !hero_ok {
        return Err(terminal(
            "clarify_invalid_hero",
            "Invalid hero section in AI response",
        ));
    }

    let process = body.get("process").and_then(Value::as_array);
    match process {
        Some(steps) if !steps.is_empty() => {
            for step in steps {
                let name = step.as_object().and_then(|s| non_empty_str(s.get("name")));
                if name.is_none() {
                    return Err(terminal(
                        "clarify_invalid_process",
                        "Process step in AI response is missing a name",
                    ));
                }
            }
        }
        _ => {
            return Err(terminal(
                "clarify_invalid_process",
                "Invalid or empty process section in AI response",
            ));
        }
    }

    match body.get("missions") {
        Some(missions) => validate_missions(TurnKind::Clarify, missions, true)?,
        None => {
            return Err(terminal(
                "clarify_invalid_missions",
                "Invalid or empty missions section in AI response",
            ));
        }
    }

    Ok(())
}

fn validate_chat(body: &serde_json::Map<String, Value>) -> Result<()> {
    if non_empty_str(body.get("reply")).is_none() {
        return Err(terminal(
            "chat_missing_reply",
            "AI response missing reply content",
        ));
    }

    if let Some(missions) = body.get("followUpMissions") {
        if !missions.is_null() {
            validate_missions(TurnKind::Chat, missions, false)?;
        }
    }

    if let Some(navigate) = body.get("navigate") {
        if !navigate.is_null() {
            let nav = navigate.as_object();
            let nav_ok = nav.is_some_and(|n| {
                non_empty_str(n.get("page")).is_some() && non_empty_str(n.get("section")).is_some()
            });
            if !nav_ok {
                return Err(terminal(
                    "chat_invalid_navigation",
                    "Navigation instruction in AI response is missing page or section",
                ));
            }
        }
    }

    Ok(())
}

/// Missions must be objects with a non-empty unique id, a title, and a
/// positive point value.
fn validate_missions(kind: TurnKind, missions: &Value, require_non_empty: bool) -> Result<()> {
    let list = missions.as_array().ok_or_else(|| {
        terminal(
            format!("{kind}_invalid_missions"),
            "Missions section in AI response is not a list",
        )
    })?;

    if require_non_empty && list.is_empty() {
        return Err(terminal(
            format!("{kind}_invalid_missions"),
            "Invalid or empty missions section in AI response",
        ));
    }

    let mut seen = HashSet::new();
    for (i, mission) in list.iter().enumerate() {
        let mission = mission.as_object().ok_or_else(|| {
            terminal(
                format!("{kind}_invalid_mission"),
                format!("Mission {} has invalid format", i + 1),
            )
        })?;

        let id = non_empty_str(mission.get("id")).ok_or_else(|| {
            terminal(
                format!("{kind}_incomplete_mission"),
                format!("Mission {} is missing an id", i + 1),
            )
        })?;
        if !seen.insert(id.to_string()) {
            return Err(terminal(
                format!("{kind}_duplicate_mission"),
                format!("Mission id '{id}' appears more than once"),
            ));
        }

        if non_empty_str(mission.get("title")).is_none() {
            return Err(terminal(
                format!("{kind}_incomplete_mission"),
                format!("Mission {} is missing a title", i + 1),
            ));
        }

        let points = mission.get("points").and_then(Value::as_i64);
        if !points.is_some_and(|p| p > 0) {
            return Err(terminal(
                format!("{kind}_invalid_mission_points"),
                format!("Mission '{id}' must have a positive point value"),
            ));
        }
    }

    Ok(())
}

/// Extracts the case-study id references from decoded output.
///
/// Anything other than a list of strings yields no references, matching the
/// tolerant handling of the content source: a malformed reference list never
/// fails the turn.
pub fn case_study_refs(value: &Value) -> Vec<String> {
    let Some(ids) = value.get("caseStudies").and_then(Value::as_array) else {
        return Vec::new();
    };
    if !ids.iter().all(Value::is_string) {
        return Vec::new();
    }
    ids.iter()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect()
}

/// Replaces the case-study references in `value` with resolved entries.
pub fn attach_case_studies(value: &mut Value, studies: &[CaseStudy]) -> Result<()> {
    if let Some(body) = value.as_object_mut() {
        body.insert("caseStudies".to_string(), serde_json::to_value(studies)?);
    }
    Ok(())
}

fn terminal(code: impl Into<String>, message: impl Into<String>) -> CompassError {
    CompassError::validation(code, message, RetryAction::None)
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
