//! Chat-completion client for the categorization stage.
//!
//! The categorizer talks to the model through [`LlmClient`]. [`OpenAiClient`]
//! is the production implementation for any OpenAI-compatible endpoint; it
//! performs a single request per call and leaves retries to the caller.

use std::future::Future;
use std::time::Duration;

use bookmark_reorg_shared::{LlmError, ReorgError, Result};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest provider error body kept in an [`LlmError::Http`].
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// A chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Omitted from the wire when `None` so the provider default applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Sends chat requests and returns the first choice's message content.
pub trait LlmClient: Send + Sync {
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = std::result::Result<String, LlmError>> + Send;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ReorgError::config("missing LLM API key"));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ReorgError::config("LLM API key is not a valid header value"))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ReorgError::Network(format!("failed to build LLM HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, LlmError> {
        debug!(model = %request.model, messages = request.messages.len(), "sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_failure(status.as_u16(), &body, &request.model));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("invalid completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Map a failed provider response onto the errors the categorizer reacts to.
fn classify_failure(status: u16, body: &str, model: &str) -> LlmError {
    let lower = body.to_lowercase();

    if lower.contains("temperature")
        && (lower.contains("unsupported") || lower.contains("does not support"))
    {
        return LlmError::UnsupportedTemperature;
    }

    if status == 404
        || (lower.contains("model")
            && (lower.contains("not found") || lower.contains("does not exist")))
    {
        return LlmError::ModelNotFound(model.to_string());
    }

    LlmError::Http {
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}
