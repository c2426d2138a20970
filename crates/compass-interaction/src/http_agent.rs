//! HTTP completion agent.
//!
//! Calls a JSON completion API directly. Configuration priority:
//! constructor arguments > environment variables.

use crate::agent::{CompletionAgent, CompletionError, CompletionRequest};
use async_trait::async_trait;
use compass_core::session::MessageRole;
use reqwest::{header::HeaderValue, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "compass-guide-1";
const DEFAULT_BASE_URL: &str = "https://completions.chainlabs.in/v1/complete";

/// Agent implementation that talks to the completion HTTP API.
#[derive(Clone)]
pub struct HttpCompletionAgent {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl HttpCompletionAgent {
    /// Creates a new agent with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// - `COMPASS_API_KEY` (required)
    /// - `COMPASS_MODEL_NAME` (defaults to `compass-guide-1`)
    /// - `COMPASS_COMPLETION_URL` (defaults to the hosted endpoint)
    pub fn try_from_env() -> Result<Self, CompletionError> {
        let api_key = env::var("COMPASS_API_KEY").map_err(|_| CompletionError::Terminal {
            status_code: None,
            message: "COMPASS_API_KEY not found in environment".to_string(),
        })?;

        let model = env::var("COMPASS_MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let mut agent = Self::new(api_key, model);
        if let Ok(url) = env::var("COMPASS_COMPLETION_URL") {
            agent.base_url = url;
        }
        Ok(agent)
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the completion endpoint URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_messages(request: &CompletionRequest) -> Vec<WireMessage> {
        let mut messages: Vec<WireMessage> = request
            .history
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();

        messages.push(WireMessage {
            role: "user",
            content: request.input.clone(),
        });

        messages
    }

    async fn send_request(
        &self,
        body: &CompleteApiRequest,
        timeout: Duration,
    ) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.base_url)
            .timeout(timeout)
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CompletionError::Timeout { timeout }
                } else if err.is_connect() {
                    CompletionError::Transient {
                        status_code: None,
                        message: format!("completion API request failed: {err}"),
                        retry_after: None,
                    }
                } else {
                    CompletionError::Terminal {
                        status_code: None,
                        message: format!("completion API request failed: {err}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read completion error body".to_string());
            return Err(map_http_error(status, body_text, retry_after));
        }

        let parsed: CompleteApiResponse =
            response.json().await.map_err(|err| CompletionError::Transient {
                status_code: None,
                message: format!("Failed to parse completion response: {err}"),
                retry_after: None,
            })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl CompletionAgent for HttpCompletionAgent {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let body = CompleteApiRequest {
            model: self.model.clone(),
            kind: request.kind.to_string(),
            session: request.session_id.clone(),
            messages: Self::build_messages(&request),
            max_tokens: self.max_tokens,
        };

        self.send_request(&body, request.timeout).await
    }
}

#[derive(Serialize)]
struct CompleteApiRequest {
    model: String,
    kind: String,
    session: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct CompleteApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn extract_text_response(response: CompleteApiResponse) -> Result<String, CompletionError> {
    response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
        })
        .ok_or_else(|| CompletionError::Transient {
            status_code: None,
            message: "completion API returned no text content".to_string(),
            retry_after: None,
        })
}

fn map_http_error(
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> CompletionError {
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);

    let is_retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );

    if is_retryable {
        CompletionError::Transient {
            status_code: Some(status.as_u16()),
            message,
            retry_after,
        }
    } else {
        CompletionError::Terminal {
            status_code: Some(status.as_u16()),
            message,
        }
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Retry-After HTTP-date parsing is omitted for simplicity
    None
}
