//! OpenAI adapter for chat completions.

use std::io::Write;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, GatewayError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, GatewayError>;
}

// =============================================================================
// OPENAI ADAPTER
// =============================================================================

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// OpenAI API adapter for chat completions.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiAdapter {
    /// Create from API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_config(api_key, "https://api.openai.com/v1", Duration::from_secs(120))
    }

    /// Create from environment variables.
    ///
    /// A missing `OPENAI_API_KEY` is a fatal configuration error, surfaced
    /// here - before any grading begins.
    pub fn from_env() -> Result<Self, GatewayError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| GatewayError::config("OPENAI_API_KEY not set"))?;

        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".into());

        let timeout = std::env::var("OPENAI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(120));

        Self::with_config(api_key, base_url, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let api_key = api_key.into();
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| GatewayError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Classify a provider error body + status into the gateway taxonomy.
    ///
    /// HTTP 429, or an error message mentioning rate limiting, is the sole
    /// retryable class. Everything else is a rejection.
    fn classify_error(status: u16, message: String, ctx: ErrorContext) -> GatewayError {
        if status == 429 || message.to_lowercase().contains("rate limit") {
            GatewayError::rate_limited(Duration::from_secs(60), ctx)
        } else {
            GatewayError::rejected_with_context(message, ctx)
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system".to_string(),
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

// =============================================================================
// COMPLETION PROVIDER IMPL
// =============================================================================

#[async_trait]
impl CompletionProvider for OpenAiAdapter {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        let start = Instant::now();

        let messages: Vec<ApiMessage> = req.messages.iter().map(ApiMessage::from).collect();

        let api_req = ChatApiRequest {
            model: req.model.model_id(),
            messages: &messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream: req.stream,
        };

        let mut response = self
            .client
            .post(self.chat_url())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());

        let ctx = ErrorContext::new().with_status(status.as_u16());
        let ctx = if let Some(id) = &request_id {
            ctx.with_request_id(id)
        } else {
            ctx
        };

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            // Try to parse a structured error
            if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
                if let Some(error) = parsed.error {
                    let message = error.message.unwrap_or_default();
                    let ctx = if let Some(code) = error.code {
                        ctx.with_code(&code)
                    } else {
                        ctx
                    };
                    return Err(Self::classify_error(status.as_u16(), message, ctx));
                }
            }

            return Err(Self::classify_error(
                status.as_u16(),
                format!("HTTP {}", status.as_u16()),
                ctx,
            ));
        }

        if req.stream {
            return read_streamed_response(response, start).await;
        }

        // Read the body in chunks to enforce the size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(GatewayError::rejected(format!(
                    "Response too large: {new_len} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::rejected(format!("Invalid JSON from provider: {e}")))?;

        // Check for API-level error in a 2xx body
        if let Some(error) = parsed.error {
            let message = error.message.unwrap_or_default();
            let ctx = if let Some(code) = error.code {
                ctx.with_code(&code)
            } else {
                ctx
            };
            return Err(Self::classify_error(status.as_u16(), message, ctx));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| GatewayError::rejected("No choices in response"))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        let usage = parsed.usage;
        let input_tokens = usage.as_ref().and_then(|u| u.prompt_tokens).unwrap_or(0);
        let output_tokens = usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
            .unwrap_or(0);

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

/// Accumulate an SSE stream into the complete response, echoing each delta
/// to stderr as it arrives. The returned content must be identical to what
/// the non-streaming path would have produced.
async fn read_streamed_response(
    mut response: reqwest::Response,
    start: Instant,
) -> Result<CompletionResponse, GatewayError> {
    let mut content = String::new();
    let mut finish_reason: Option<String> = None;
    let mut line_buf = String::new();

    while let Some(chunk) = response.chunk().await? {
        line_buf.push_str(&String::from_utf8_lossy(&chunk));

        // Drain complete lines; SSE events are newline-delimited
        while let Some(pos) = line_buf.find('\n') {
            let line: String = line_buf.drain(..=pos).collect();
            let line = line.trim();

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                continue;
            }

            let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                continue;
            };
            let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
                continue;
            };

            if let Some(reason) = choice.finish_reason {
                finish_reason = Some(reason);
            }
            if let Some(delta) = choice.delta.and_then(|d| d.content) {
                if content.len() + delta.len() > MAX_RESPONSE_LEN {
                    return Err(GatewayError::rejected("Streamed response too large"));
                }
                eprint!("{delta}");
                let _ = std::io::stderr().flush();
                content.push_str(&delta);
            }
        }
    }
    eprintln!();

    Ok(CompletionResponse {
        content: content.trim().to_string(),
        input_tokens: 0,
        output_tokens: 0,
        latency: start.elapsed(),
        finish_reason: FinishReason::from(finish_reason),
    })
}
