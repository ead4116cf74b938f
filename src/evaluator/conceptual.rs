//! Multi-part conceptual evaluator: guided feedback, no pass/fail.
//!
//! Certifies completion, not correctness: the outcome always carries the
//! sentinel rate sequence `[1.0]`, and the trace is the feedback text
//! itself.

use crate::evaluator::EvaluationOutcome;
use crate::gateway::{
    Attribution, CompletionGateway, CompletionModel, CompletionRequest, GatewayError,
};
use crate::prompts;

/// One multi-part conceptual question to review.
#[derive(Debug, Clone)]
pub struct ConceptualRequest<'a> {
    pub instructions: &'a [String],
    /// May be shorter than `instructions`; missing entries are reviewed as
    /// the explicit no-answer placeholder.
    pub answers: &'a [String],
    /// Echo partial model output to stderr as it arrives.
    pub stream: bool,
}

/// Produce qualitative feedback for a multi-part question with a single
/// gateway call over every instruction/answer pair.
pub async fn evaluate(
    gateway: &dyn CompletionGateway,
    model: &CompletionModel,
    attribution: &Attribution,
    req: ConceptualRequest<'_>,
) -> Result<EvaluationOutcome, GatewayError> {
    let prompt = prompts::render_feedback(req.instructions, req.answers);

    let call = CompletionRequest::new(model.clone(), prompt.to_messages(), attribution.clone())
        .streaming(req.stream);
    let resp = gateway.complete(call).await?;

    Ok(EvaluationOutcome {
        time: resp.latency.as_secs_f64(),
        rates: vec![1.0],
        avg_rates: 1.0,
        test_history: resp.content,
    })
}
