//! Evaluators: turn one (question, answer) pair into one graded outcome.
//!
//! Two shapes of question, two evaluators:
//! - [`consensus`] - single-instruction questions with discrete test cases,
//!   graded by first-success sampling per test case.
//! - [`conceptual`] - multi-part questions with no pass/fail criterion,
//!   graded as qualitative feedback.
//!
//! Both produce an [`EvaluationOutcome`] whose trace carries every prompt
//! and raw response for audit.

pub mod conceptual;
pub mod consensus;
pub mod verdict;

use serde::{Deserialize, Serialize};

/// Default acceptance cutoff on `avg_rates`.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Result of evaluating one question for one student.
///
/// Field names match the persisted results format. `time` is the summed
/// remote-call latency for the evaluation, so identical gateway responses
/// produce identical outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// Seconds spent in remote calls.
    pub time: f64,
    /// Per-test-case success rates, each in [0, 1]. A single sentinel 1.0
    /// for conceptual questions.
    pub rates: Vec<f64>,
    /// Mean of `rates`, or 0 when there are no rates.
    pub avg_rates: f64,
    /// Ordered audit trail of every prompt/response exchanged, or the raw
    /// feedback text for conceptual questions.
    pub test_history: String,
}

impl EvaluationOutcome {
    /// Acceptance is a pure function of the aggregate rate and the
    /// threshold - never of trace content.
    pub fn accepted(&self, threshold: f64) -> bool {
        self.avg_rates >= threshold
    }
}

pub(crate) fn mean(rates: &[f64]) -> f64 {
    if rates.is_empty() {
        0.0
    } else {
        rates.iter().sum::<f64>() / rates.len() as f64
    }
}
