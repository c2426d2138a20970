//! Decoding raw model output into JSON.
//!
//! Models frequently wrap their structured answer in a Markdown fence even
//! when told not to; the codec accepts the first ```json fence, or the bare
//! text when no fence is present.

use compass_core::error::{CompassError, Result, RetryAction};
use compass_core::turn::TurnKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```json\s*(.*?)\s*```").expect("fenced-json regex is valid"));

/// Decodes raw completion output for `kind` into a JSON value.
///
/// Undecodable output is reported as retryable: it has the same truncated
/// shape as a cut-off response, and one more attempt often fixes it.
pub fn decode_completion(kind: TurnKind, text: &str) -> Result<Value> {
    let candidate = FENCED_JSON
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
        .trim();

    serde_json::from_str(candidate).map_err(|err| {
        CompassError::validation(
            format!("{kind}_malformed_output"),
            format!("Completion output is not valid JSON: {err}"),
            RetryAction::Retry,
        )
    })
}
