#![forbid(unsafe_code)]

//! # rubric-harness
//!
//! Automated grading of open-ended student answers, with the judgment
//! delegated to a remote LLM. The hard part is not the file I/O - it is
//! making a single non-deterministic, rate-limited, occasionally-failing
//! remote call into a reliable grading primitive.
//!
//! The pieces, leaves first:
//! - [`gateway`] - retry/backoff around one remote completion call
//! - [`evaluator`] - per-test-case consensus voting and multi-part
//!   qualitative feedback
//! - [`grader`] - the batch orchestrator that sequences evaluation across
//!   a roster of submissions against a master question bank
//!
//! Every judgment exchanged with the model is retained in the outcome's
//! trace: grading never fails silently.

pub mod bank;
pub mod evaluator;
pub mod gateway;
pub mod grader;
pub mod prompts;

pub use bank::{discover_submissions, load_submission, QuestionBank, StudentSubmission};
pub use evaluator::{EvaluationOutcome, DEFAULT_THRESHOLD};
pub use gateway::{
    Attribution, CompletionGateway, CompletionModel, GatewayConfig, GatewayError, NoopUsageSink,
    ProviderGateway, StderrUsageSink, UsageSink,
};
pub use grader::{save_session, GradeError, Grader, GraderConfig, GradingSession};
