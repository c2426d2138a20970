//! Payload validation for completion-service output.
//!
//! Checks are pure: they look at the decoded JSON for a given turn kind and
//! either pass or raise a [`crate::CompassError::Validation`] with a stable
//! `error_code` and retry guidance. Truncated/empty output is the one
//! retryable shape; everything else is terminal.

mod checks;
mod payload;

pub use checks::{
    attach_case_studies, case_study_refs, ensure_input, ensure_turn_allowed, validate_payload,
};
pub use payload::{
    ChatPayload, ClarifyPayload, GoalPayload, Hero, Mission, Navigation, ProcessStep, TurnPayload,
};
