//! Batch grading orchestrator.
//!
//! Sequences evaluation across the full roster and question bank, producing
//! one [`GradingSession`]. Students fan out through a bounded worker pool
//! (each student's grading run is independent and read-only with respect to
//! the bank); questions within one student run sequentially, and retry
//! state stays local to each in-flight gateway call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::bank::{InputError, QuestionBank, StudentSubmission, SubmittedAnswer};
use crate::evaluator::{conceptual, consensus, EvaluationOutcome, DEFAULT_THRESHOLD};
use crate::gateway::{Attribution, CompletionGateway, CompletionModel, GatewayError};

/// Per-question outcomes for one student, keyed `"q<id>"`.
pub type QuestionResults = BTreeMap<String, EvaluationOutcome>;

/// The full result set: submission file name -> question id -> outcome.
/// BTreeMaps end to end, so serialization is deterministic.
pub type GradingSession = BTreeMap<String, QuestionResults>;

/// Errors from orchestrating a grading run.
#[derive(Debug, Error)]
pub enum GradeError {
    /// Grading was invoked before a question bank was loaded.
    #[error("no master assignment loaded")]
    NoMasterAssignment,

    /// The submission set is empty. Non-fatal; callers typically report it
    /// and exit cleanly.
    #[error("no student submissions to grade")]
    NoSubmissions,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write results to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Grading run configuration. Explicit and immutable - no ambient state.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Which backend model variant answers judgment calls.
    pub model: CompletionModel,
    /// Acceptance cutoff on `avg_rates`.
    pub threshold: f64,
    /// Bound on concurrently graded students.
    pub parallel: usize,
    /// Echo partial model output to stderr as it arrives.
    pub stream: bool,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            model: CompletionModel::default(),
            threshold: DEFAULT_THRESHOLD,
            parallel: 1,
            stream: false,
        }
    }
}

/// The batch grading orchestrator.
pub struct Grader {
    gateway: Arc<dyn CompletionGateway>,
    config: GraderConfig,
    bank: Option<QuestionBank>,
    submissions: BTreeMap<String, StudentSubmission>,
}

impl Grader {
    pub fn new(gateway: Arc<dyn CompletionGateway>, config: GraderConfig) -> Self {
        Self {
            gateway,
            config,
            bank: None,
            submissions: BTreeMap::new(),
        }
    }

    /// Load the master question bank as the source of truth.
    pub fn load_assignment(&mut self, path: impl AsRef<Path>) -> Result<(), InputError> {
        let bank = QuestionBank::load(path.as_ref())?;
        eprintln!(
            "[grade] loaded master assignment with {} questions from {}",
            bank.len(),
            path.as_ref().display()
        );
        self.bank = Some(bank);
        Ok(())
    }

    /// Install an already-loaded bank (library embedders, tests).
    pub fn set_bank(&mut self, bank: QuestionBank) {
        self.bank = Some(bank);
    }

    /// Register one student's submission under its file name.
    pub fn add_submission(&mut self, student_id: impl Into<String>, submission: StudentSubmission) {
        self.submissions.insert(student_id.into(), submission);
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    /// Grade every registered submission against the master bank.
    pub async fn grade_all(&self) -> Result<GradingSession, GradeError> {
        let bank = self.bank.as_ref().ok_or(GradeError::NoMasterAssignment)?;
        if self.submissions.is_empty() {
            return Err(GradeError::NoSubmissions);
        }

        let total = self.submissions.len();
        eprintln!(
            "[grade] grading {} submissions (parallel={})",
            total,
            self.config.parallel.max(1)
        );

        let student_futures =
            self.submissions
                .iter()
                .enumerate()
                .map(|(idx, (student_id, submission))| async move {
                    eprintln!("[grade] [{}/{}] grading student: {}", idx + 1, total, student_id);
                    let results = self.grade_student(bank, student_id, submission).await;
                    (student_id.clone(), results)
                });

        let graded: Vec<(String, QuestionResults)> = stream::iter(student_futures)
            .buffer_unordered(self.config.parallel.max(1))
            .collect()
            .await;

        // Completion order is nondeterministic under parallelism; the map
        // restores a stable order for persistence.
        let mut session = GradingSession::new();
        for (student_id, results) in graded {
            session.insert(student_id, results);
        }

        eprintln!("[grade] grading complete");
        Ok(session)
    }

    /// Grade one student's submission. Failures local to one question are
    /// contained here: the question is logged and absent from the results,
    /// and the rest of the submission still grades.
    async fn grade_student(
        &self,
        bank: &QuestionBank,
        student_id: &str,
        submission: &StudentSubmission,
    ) -> QuestionResults {
        let mut results = QuestionResults::new();

        for (question_id, content) in submission {
            let Some(master) = bank.get(question_id) else {
                eprintln!(
                    "[grade] warning: question {question_id} from {student_id} not found in master assignment; skipping"
                );
                tracing::warn!(
                    student = student_id,
                    question = %question_id,
                    "submission references unknown question id"
                );
                continue;
            };

            eprintln!("[grade] {student_id}: grading {question_id}");
            match self.grade_question(student_id, question_id, master, content).await {
                Ok(outcome) => {
                    results.insert(question_id.clone(), outcome);
                }
                Err(err) => {
                    // Rejected mid-evaluation: abort this evaluation only,
                    // never the batch.
                    eprintln!("[grade] {student_id}/{question_id} FAILED: {err}");
                    tracing::error!(
                        student = student_id,
                        question = %question_id,
                        error = %err,
                        "evaluation aborted"
                    );
                }
            }
        }

        results
    }

    /// Select the evaluator by question shape and run it. The master
    /// question's instructions and test cases are used, never the
    /// student-submitted ones.
    async fn grade_question(
        &self,
        student_id: &str,
        question_id: &str,
        master: &crate::bank::MasterQuestion,
        content: &SubmittedAnswer,
    ) -> Result<EvaluationOutcome, GatewayError> {
        if master.has_testcases() {
            let attribution = Attribution::new("consensus::sample")
                .with_student(student_id)
                .with_question(question_id);
            consensus::evaluate(
                self.gateway.as_ref(),
                &self.config.model,
                &attribution,
                consensus::ConsensusRequest {
                    instruction: master.instructions.first().map(String::as_str).unwrap_or(""),
                    answer: content.answers.first().map(String::as_str).unwrap_or(""),
                    testcases: &master.testcases,
                    threshold: self.config.threshold,
                    stream: self.config.stream,
                },
            )
            .await
        } else {
            let attribution = Attribution::new("conceptual::feedback")
                .with_student(student_id)
                .with_question(question_id);
            conceptual::evaluate(
                self.gateway.as_ref(),
                &self.config.model,
                &attribution,
                conceptual::ConceptualRequest {
                    instructions: &master.instructions,
                    answers: &content.answers,
                    stream: self.config.stream,
                },
            )
            .await
        }
    }
}

/// Persist a completed session as pretty-printed JSON.
pub fn save_session(session: &GradingSession, path: impl AsRef<Path>) -> Result<(), GradeError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json).map_err(|source| GradeError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    eprintln!("[grade] results saved to {}", path.display());
    Ok(())
}
