//! Core types for the completion gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage accounting and debugging.
///
/// Every request through the gateway carries attribution so the call log
/// can answer: which student/question triggered this call, and from which
/// code path.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Student submission the call belongs to (if any).
    pub student_id: Option<String>,
    /// Question the call belongs to (if any), e.g. "q3".
    pub question_id: Option<String>,
    /// Which code path made this call, for debugging.
    /// Use a static string like "consensus::sample" or "conceptual::feedback".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    pub fn with_question(mut self, question_id: impl Into<String>) -> Self {
        self.question_id = Some(question_id.into());
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Completion model specification.
///
/// The model id selects which backend variant answers calls; no other
/// gateway behavior depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionModel {
    /// OpenAI model, e.g. "gpt-4o-mini"
    OpenAi(String),
}

/// Default judgment model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

impl CompletionModel {
    pub fn openai(model_id: impl Into<String>) -> Self {
        CompletionModel::OpenAi(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            CompletionModel::OpenAi(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            CompletionModel::OpenAi(_) => "openai",
        }
    }
}

impl Default for CompletionModel {
    fn default() -> Self {
        CompletionModel::OpenAi(DEFAULT_MODEL.to_string())
    }
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use.
    pub model: CompletionModel,
    /// Messages in the conversation. Grading prompts are a single user turn.
    pub messages: Vec<Message>,
    /// Sampling temperature. Defaults to 0.7: low enough for consistent
    /// grading, high enough that repeated samples are independent draws.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Surface partial output on stderr as it arrives. Observational only:
    /// the returned content is identical either way.
    pub stream: bool,
    /// Attribution for usage accounting.
    pub attribution: Attribution,
}

impl CompletionRequest {
    pub fn new(model: CompletionModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.7,
            max_tokens: None,
            stream: false,
            attribution,
        }
    }

    /// Single-prompt convenience constructor.
    pub fn prompt(
        model: CompletionModel,
        prompt: impl Into<String>,
        attribution: Attribution,
    ) -> Self {
        Self::new(model, vec![Message::user(prompt)], attribution)
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content, stripped of leading/trailing whitespace.
    pub content: String,
    /// Input tokens consumed (0 when the provider omits usage, e.g. streaming).
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    pub(crate) fn empty() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Unknown("error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_defaults() {
        let req = CompletionRequest::prompt(
            CompletionModel::default(),
            "hi",
            Attribution::new("test"),
        );
        assert_eq!(req.model.model_id(), DEFAULT_MODEL);
        assert!((req.temperature - 0.7).abs() < 1e-6);
        assert!(!req.stream);
        assert!(req.max_tokens.is_none());
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn attribution_builder() {
        let attr = Attribution::new("consensus::sample")
            .with_student("answers_alice.json")
            .with_question("q2");
        assert_eq!(attr.caller, "consensus::sample");
        assert_eq!(attr.student_id.as_deref(), Some("answers_alice.json"));
        assert_eq!(attr.question_id.as_deref(), Some("q2"));
    }
}
