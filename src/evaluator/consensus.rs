//! Single-criterion evaluator: first-success sampling per test case.
//!
//! Model output is non-deterministic, so a single "Incorrect" is weak
//! evidence. Each test case is sampled up to [`MAX_SAMPLES`] times and
//! passes on the first affirmative verdict; the per-case rate
//! `successes / attempts_used` rewards answers the judge accepts quickly.

use crate::evaluator::{mean, verdict, EvaluationOutcome};
use crate::gateway::{
    Attribution, CompletionGateway, CompletionModel, CompletionRequest, GatewayError,
};
use crate::prompts;

/// Samples per test case.
pub const MAX_SAMPLES: u32 = 3;

/// Outcome of sampling one test case.
///
/// An explicit tagged result instead of breaking out of the loop ad hoc:
/// the rate math reads directly off the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseVerdict {
    /// First affirmative verdict arrived on this (1-indexed) attempt.
    Passed { attempts: u32 },
    /// All samples consumed without an affirmative verdict.
    Exhausted,
}

impl CaseVerdict {
    /// Per-test-case success rate: `1/attempts` on pass, `0` on exhaustion.
    pub fn rate(&self) -> f64 {
        match self {
            CaseVerdict::Passed { attempts } => 1.0 / f64::from(*attempts),
            CaseVerdict::Exhausted => 0.0,
        }
    }
}

/// One single-instruction question to grade against its test cases.
#[derive(Debug, Clone)]
pub struct ConsensusRequest<'a> {
    pub instruction: &'a str,
    pub answer: &'a str,
    /// Evaluated independently, in order, duplicates included.
    pub testcases: &'a [String],
    /// Acceptance cutoff recorded in the trace footer.
    pub threshold: f64,
    /// Echo partial model output to stderr as it arrives.
    pub stream: bool,
}

/// Grade one single-instruction question by consensus voting over its
/// test cases.
///
/// Gateway exhaustion (`Unavailable`) is recorded in the trace and fails
/// the affected test case; any other gateway error aborts this evaluation
/// and propagates to the orchestrator.
///
/// Zero test cases yield an empty rate sequence and `avg_rates = 0` - the
/// question is effectively ungraded, and the caller decides whether that
/// warrants a warning.
pub async fn evaluate(
    gateway: &dyn CompletionGateway,
    model: &CompletionModel,
    attribution: &Attribution,
    req: ConsensusRequest<'_>,
) -> Result<EvaluationOutcome, GatewayError> {
    let mut trace = String::new();
    let mut rates = Vec::with_capacity(req.testcases.len());
    let mut elapsed = 0.0_f64;

    for testcase in req.testcases {
        let prompt = prompts::render_verdict(req.instruction, req.answer, testcase);
        trace.push_str(&format!(
            "Prompt for test case '{}':\n{}\n\n",
            testcase,
            prompt.transcript()
        ));

        let mut case_verdict = CaseVerdict::Exhausted;
        for attempt in 1..=MAX_SAMPLES {
            let call = CompletionRequest::new(
                model.clone(),
                prompt.to_messages(),
                attribution.clone(),
            )
            .streaming(req.stream);

            match gateway.complete(call).await {
                Ok(resp) => {
                    elapsed += resp.latency.as_secs_f64();
                    trace.push_str(&format!(
                        "Attempt {} Evaluation:\n{}\n\n",
                        attempt, resp.content
                    ));
                    if verdict::is_affirmative(&resp.content) {
                        case_verdict = CaseVerdict::Passed { attempts: attempt };
                        break;
                    }
                }
                Err(err @ GatewayError::Unavailable { .. }) => {
                    trace.push_str(&format!(
                        "Attempt {} Evaluation:\n[service unavailable: {}]\n\n",
                        attempt, err
                    ));
                    tracing::warn!(testcase = %testcase, error = %err, "test case failed on unavailable service");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        rates.push(case_verdict.rate());
    }

    let avg_rates = mean(&rates);
    if avg_rates >= req.threshold {
        trace.push_str("\nOverall Result: Accepted");
    } else {
        trace.push_str(&format!(
            "\nOverall Result: Not Accepted (Threshold: {})",
            req.threshold
        ));
    }

    Ok(EvaluationOutcome {
        time: elapsed,
        rates,
        avg_rates,
        test_history: trace,
    })
}
