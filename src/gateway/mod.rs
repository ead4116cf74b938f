//! Completion gateway: one prompt in, one judged response out.
//!
//! `ProviderGateway` wraps the OpenAI adapter with the attempt budget and
//! exponential backoff that turn a flaky remote call into a grading
//! primitive. Evaluators depend only on the `CompletionGateway` trait, so
//! tests drive them with deterministic stubs.

pub mod error;
pub mod openai;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use openai::{CompletionProvider, OpenAiAdapter};
use usage::{CallStatus, ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, GatewayError};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Total attempt budget per call (not extra retries).
    pub max_attempts: u32,
    /// Backoff base: attempt `i` (0-indexed) sleeps `base * 2^i` after a
    /// rate-limited failure.
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ProviderGateway<U: UsageSinkTrait> {
    adapter: OpenAiAdapter,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> CompletionGateway for ProviderGateway<U> {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        ProviderGateway::complete(self, req).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    /// Construct from environment. Fails fast on a missing credential,
    /// before any grading begins.
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, GatewayError> {
        let adapter = OpenAiAdapter::from_env()?;
        Ok(Self {
            adapter,
            usage_sink,
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(adapter: OpenAiAdapter, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        Self {
            adapter,
            usage_sink,
            config,
        }
    }

    pub async fn complete(
        &self,
        req: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let mut last_error: Option<GatewayError> = None;
        let attempts = self.config.max_attempts.max(1);

        for attempt in 0..attempts {
            let result = self.adapter.complete(&req).await;
            match result {
                Ok(resp) => {
                    self.record_usage(&req, &resp, CallStatus::Success, None)
                        .await;
                    return Ok(resp);
                }
                Err(err) => {
                    let code = err.code().to_string();
                    self.record_usage(&req, &CompletionResponse::empty(), CallStatus::Error, Some(code))
                        .await;

                    if !err.is_retryable() {
                        return Err(err);
                    }

                    // Sleep even after the final failed attempt - the wait
                    // sequence for a 3-attempt budget is 1, 2, 4 time units.
                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited; backing off before next attempt"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(GatewayError::Unavailable {
            attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| GatewayError::rejected("unknown error")),
            ),
        })
    }

    async fn record_usage(
        &self,
        req: &CompletionRequest,
        resp: &CompletionResponse,
        status: CallStatus,
        error_code: Option<String>,
    ) {
        let record = ProviderCallRecord::new(
            req.model.provider(),
            "chat/completions",
            req.model.model_id(),
            req.attribution.caller,
        )
        .tokens(resp.input_tokens as i32, resp.output_tokens as i32)
        .student(req.attribution.student_id.clone())
        .question(req.attribution.question_id.clone())
        .latency(resp.latency.as_millis() as i32);

        let record = if status == CallStatus::Error {
            record.error(error_code.unwrap_or_else(|| "provider_error".to_string()))
        } else {
            record
        };

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
