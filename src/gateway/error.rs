//! Error types for the completion gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "rate_limit_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the completion service.
///
/// Only `RateLimited` is retryable. Every other failure class aborts the
/// call immediately: the retry loop exists to ride out provider throttling,
/// not to paper over malformed requests or auth problems.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Provider throttled the request - the one retryable class.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    /// Provider rejected the call (malformed request, auth failure,
    /// refusal, server fault) - permanent, never retried.
    #[error("service rejected request: {message}")]
    Rejected {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Retry budget exhausted on rate limiting. Wraps the last underlying
    /// failure for diagnostics.
    #[error("service unavailable after {attempts} attempts")]
    Unavailable {
        attempts: u32,
        #[source]
        last: Box<GatewayError>,
    },

    /// HTTP/network error. Not retried - see the retry policy note above.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.). Raised at construction,
    /// before any grading begins.
    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Create a rate limited error.
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    /// Create a rejected error without provider context.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
            context: None,
        }
    }

    /// Create a rejected error with provider context.
    pub fn rejected_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Rejected {
            message: message.into(),
            context: Some(context),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the gateway may re-issue the call after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::Rejected { context, .. } => context.as_ref(),
            Self::Unavailable { last, .. } => last.context(),
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}
