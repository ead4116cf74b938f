use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rubric_harness::bank::{QuestionBank, StudentSubmission, SubmittedAnswer};
use rubric_harness::evaluator::consensus::{self, ConsensusRequest};
use rubric_harness::gateway::{
    CompletionGateway, CompletionRequest, CompletionResponse, ErrorContext, FinishReason,
    GatewayError,
};
use rubric_harness::grader::{save_session, GradeError, Grader, GraderConfig};
use rubric_harness::prompts::NO_ANSWER_PLACEHOLDER;

// =============================================================================
// Stub gateways
// =============================================================================

fn canned_response(content: &str) -> CompletionResponse {
    CompletionResponse {
        content: content.trim().to_string(),
        input_tokens: 0,
        output_tokens: 0,
        latency: Duration::ZERO,
        finish_reason: FinishReason::Stop,
    }
}

/// Returns the same canned content for every call, recording prompts.
struct FixedGateway {
    content: &'static str,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FixedGateway {
    fn new(content: &'static str) -> Arc<Self> {
        Arc::new(Self {
            content,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionGateway for FixedGateway {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = req
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        Ok(canned_response(self.content))
    }
}

/// Pops one scripted result per call; panics if called once dry.
struct SequenceGateway {
    script: Mutex<VecDeque<Result<&'static str, GatewayError>>>,
}

impl SequenceGateway {
    fn new(script: Vec<Result<&'static str, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl CompletionGateway for SequenceGateway {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted gateway exhausted");
        next.map(canned_response)
    }
}

fn unavailable_error() -> GatewayError {
    GatewayError::Unavailable {
        attempts: 3,
        last: Box::new(GatewayError::rate_limited(
            Duration::from_secs(60),
            ErrorContext::new().with_status(429),
        )),
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const RECURSION_BANK: &str = r#"{
    "questions": [
        { "id": 1, "text": "Recursion", "instructions": ["explain recursion"], "testcases": ["base case present"] }
    ]
}"#;

const FIVE_QUESTION_BANK: &str = r#"{
    "questions": [
        { "id": 1, "text": "Recursion", "instructions": ["explain recursion"], "testcases": ["base case present"] },
        { "id": 2, "text": "Stacks", "instructions": ["define a stack", "define a queue", "compare the two"] },
        { "id": 3, "text": "Sorting", "instructions": ["explain quicksort"], "testcases": ["pivot choice discussed"] },
        { "id": 4, "text": "Graphs", "instructions": ["define a DAG"], "testcases": ["acyclicity mentioned"] },
        { "id": 5, "text": "Hashing", "instructions": ["explain collisions"] }
    ]
}"#;

fn bank_from_json(json: &str) -> QuestionBank {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(json.as_bytes()).unwrap();
    QuestionBank::load(f.path()).unwrap()
}

fn submission(entries: &[(&str, &[&str])]) -> StudentSubmission {
    entries
        .iter()
        .map(|(qid, answers)| {
            (
                qid.to_string(),
                SubmittedAnswer {
                    answers: answers.iter().map(|a| a.to_string()).collect(),
                    testcases: None,
                },
            )
        })
        .collect()
}

fn grader_with(gateway: Arc<dyn CompletionGateway>, bank_json: &str) -> Grader {
    let mut grader = Grader::new(gateway, GraderConfig::default());
    grader.set_bank(bank_from_json(bank_json));
    grader
}

// =============================================================================
// Consensus scenarios
// =============================================================================

#[tokio::test]
async fn correct_on_first_attempt_scores_full_rate() {
    let gateway = FixedGateway::new("The explanation names a terminating base case. Correct");
    let mut grader = grader_with(gateway.clone(), RECURSION_BANK);
    grader.add_submission(
        "answers_alice.json",
        submission(&[(
            "q1",
            &["A recursive function needs a base case that stops the recursion"],
        )]),
    );

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_alice.json"]["q1"];

    assert_eq!(outcome.rates, vec![1.0]);
    assert_eq!(outcome.avg_rates, 1.0);
    assert!(outcome.accepted(0.5));
    // First success stops sampling.
    assert_eq!(gateway.calls(), 1);
    assert!(outcome.test_history.contains("Attempt 1 Evaluation"));
    assert!(outcome.test_history.contains("Overall Result: Accepted"));
}

#[tokio::test]
async fn incorrect_exhausts_all_three_attempts() {
    let gateway = FixedGateway::new("The student never identifies a base case. Incorrect");
    let mut grader = grader_with(gateway.clone(), RECURSION_BANK);
    grader.add_submission(
        "answers_bob.json",
        submission(&[("q1", &["recursion is when code repeats"])]),
    );

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_bob.json"]["q1"];

    assert_eq!(gateway.calls(), 3);
    assert_eq!(outcome.rates, vec![0.0]);
    assert_eq!(outcome.avg_rates, 0.0);
    assert!(!outcome.accepted(0.5));
    assert!(outcome.test_history.contains("Attempt 3 Evaluation"));
    assert!(outcome
        .test_history
        .contains("Overall Result: Not Accepted (Threshold: 0.5)"));
}

#[tokio::test]
async fn pass_on_second_attempt_scores_half() {
    let gateway = SequenceGateway::new(vec![
        Ok("Too vague to evaluate. Incorrect"),
        Ok("On reflection, the base case is covered. Correct"),
    ]);
    let mut grader = grader_with(gateway, RECURSION_BANK);
    grader.add_submission(
        "answers_carol.json",
        submission(&[("q1", &["stops when n reaches zero"])]),
    );

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_carol.json"]["q1"];

    assert_eq!(outcome.rates, vec![0.5]);
    assert_eq!(outcome.avg_rates, 0.5);
    // avg_rates == threshold is accepted.
    assert!(outcome.accepted(0.5));
}

#[tokio::test]
async fn every_rate_is_a_first_success_fraction() {
    // Two test cases: one passes on attempt 3, one exhausts.
    let gateway = SequenceGateway::new(vec![
        Ok("Incorrect"),
        Ok("Incorrect"),
        Ok("Correct"),
        Ok("Incorrect"),
        Ok("Incorrect"),
        Ok("Incorrect"),
    ]);
    let bank = r#"{
        "questions": [
            { "id": 1, "text": "Recursion", "instructions": ["explain recursion"],
              "testcases": ["base case present", "recursive step present"] }
        ]
    }"#;
    let mut grader = grader_with(gateway, bank);
    grader.add_submission("answers_dave.json", submission(&[("q1", &["it recurses"])]));

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_dave.json"]["q1"];

    assert_eq!(outcome.rates.len(), 2);
    assert!((outcome.rates[0] - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(outcome.rates[1], 0.0);
    assert!((outcome.avg_rates - 1.0 / 6.0).abs() < 1e-12);
}

#[tokio::test]
async fn unavailable_service_fails_the_case_and_grading_continues() {
    let gateway = SequenceGateway::new(vec![
        Err(unavailable_error()),
        Ok("The recursive step is described. Correct"),
    ]);
    let bank = r#"{
        "questions": [
            { "id": 1, "text": "Recursion", "instructions": ["explain recursion"],
              "testcases": ["base case present", "recursive step present"] }
        ]
    }"#;
    let mut grader = grader_with(gateway, bank);
    grader.add_submission("answers_erin.json", submission(&[("q1", &["see notes"])]));

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_erin.json"]["q1"];

    assert_eq!(outcome.rates, vec![0.0, 1.0]);
    assert_eq!(outcome.avg_rates, 0.5);
    // The failure is auditable in the trace, not silent.
    assert!(outcome.test_history.contains("service unavailable"));
}

#[tokio::test]
async fn empty_testcase_sequence_yields_zero_avg_without_calls() {
    let gateway = FixedGateway::new("Correct");
    let outcome = consensus::evaluate(
        gateway.as_ref(),
        &Default::default(),
        &rubric_harness::Attribution::new("test"),
        ConsensusRequest {
            instruction: "explain recursion",
            answer: "it recurses",
            testcases: &[],
            threshold: 0.5,
            stream: false,
        },
    )
    .await
    .unwrap();

    assert!(outcome.rates.is_empty());
    assert_eq!(outcome.avg_rates, 0.0);
    assert!(!outcome.accepted(0.5));
    assert_eq!(gateway.calls(), 0);
}

// =============================================================================
// Conceptual scenarios
// =============================================================================

#[tokio::test]
async fn conceptual_question_reviews_missing_answers_as_placeholder() {
    let gateway = FixedGateway::new("Parts one and two are solid; part three is missing.");
    let bank = r#"{
        "questions": [
            { "id": 2, "text": "Concepts",
              "instructions": ["define a stack", "define a queue", "compare the two"] }
        ]
    }"#;
    let mut grader = grader_with(gateway.clone(), bank);
    grader.add_submission(
        "answers_frank.json",
        submission(&[("q2", &["LIFO", "FIFO"])]),
    );

    let session = grader.grade_all().await.unwrap();
    let outcome = &session["answers_frank.json"]["q2"];

    // Completion, not correctness.
    assert_eq!(outcome.rates, vec![1.0]);
    assert_eq!(outcome.avg_rates, 1.0);
    assert_eq!(
        outcome.test_history,
        "Parts one and two are solid; part three is missing."
    );

    // One call, with the third slot substituted, never a crash.
    assert_eq!(gateway.calls(), 1);
    let prompts = gateway.prompts.lock().unwrap();
    assert!(prompts[0].contains("Student's Answer 2: FIFO"));
    assert!(prompts[0].contains(&format!("Student's Answer 3: {NO_ANSWER_PLACEHOLDER}")));
}

// =============================================================================
// Orchestrator scenarios
// =============================================================================

#[tokio::test]
async fn unknown_question_is_skipped_with_others_graded() {
    let gateway = FixedGateway::new("Looks right. Correct");
    let mut grader = grader_with(gateway, FIVE_QUESTION_BANK);
    grader.add_submission(
        "answers_gina.json",
        submission(&[
            ("q1", &["base case stops it"]),
            ("q7", &["this question does not exist"]),
        ]),
    );

    let session = grader.grade_all().await.unwrap();
    let results = &session["answers_gina.json"];

    assert!(results.contains_key("q1"));
    assert!(!results.contains_key("q7"));
}

#[tokio::test]
async fn rejected_call_aborts_one_evaluation_not_the_batch() {
    // q1 (consensus) hits a rejected call; q2 (conceptual) still grades.
    let gateway = SequenceGateway::new(vec![
        Err(GatewayError::rejected("invalid request")),
        Ok("Reasonable first attempt at both parts."),
    ]);
    let bank = r#"{
        "questions": [
            { "id": 1, "text": "Recursion", "instructions": ["explain recursion"], "testcases": ["base case present"] },
            { "id": 2, "text": "Concepts", "instructions": ["define a stack", "define a queue"] }
        ]
    }"#;
    let mut grader = grader_with(gateway, bank);
    grader.add_submission(
        "answers_hana.json",
        submission(&[("q1", &["it recurses"]), ("q2", &["LIFO", "FIFO"])]),
    );

    let session = grader.grade_all().await.unwrap();
    let results = &session["answers_hana.json"];

    assert!(!results.contains_key("q1"));
    assert!(results.contains_key("q2"));
}

#[tokio::test]
async fn grading_without_a_bank_fails() {
    let gateway = FixedGateway::new("Correct");
    let grader = Grader::new(gateway, GraderConfig::default());
    let err = grader.grade_all().await.unwrap_err();
    assert!(matches!(err, GradeError::NoMasterAssignment));
}

#[tokio::test]
async fn grading_with_no_submissions_fails_early() {
    let gateway = FixedGateway::new("Correct");
    let grader = grader_with(gateway, RECURSION_BANK);
    let err = grader.grade_all().await.unwrap_err();
    assert!(matches!(err, GradeError::NoSubmissions));
}

#[tokio::test]
async fn parallel_grading_produces_the_same_session() {
    let sequential = FixedGateway::new("Looks right. Correct");
    let concurrent = FixedGateway::new("Looks right. Correct");

    let mut a = Grader::new(sequential, GraderConfig::default());
    let mut b = Grader::new(
        concurrent,
        GraderConfig {
            parallel: 4,
            ..GraderConfig::default()
        },
    );

    for grader in [&mut a, &mut b] {
        grader.set_bank(bank_from_json(FIVE_QUESTION_BANK));
        for student in ["answers_x.json", "answers_y.json", "answers_z.json"] {
            grader.add_submission(
                student,
                submission(&[("q1", &["base case"]), ("q3", &["pivot"])]),
            );
        }
    }

    let sa = a.grade_all().await.unwrap();
    let sb = b.grade_all().await.unwrap();
    assert_eq!(
        serde_json::to_string_pretty(&sa).unwrap(),
        serde_json::to_string_pretty(&sb).unwrap()
    );
}

#[tokio::test]
async fn rerunning_the_same_inputs_is_byte_identical() {
    let mut sessions = Vec::new();
    for _ in 0..2 {
        let gateway = FixedGateway::new("The base case is named. Correct");
        let mut grader = grader_with(gateway, FIVE_QUESTION_BANK);
        grader.add_submission(
            "answers_ivan.json",
            submission(&[("q1", &["stops at zero"]), ("q5", &["chaining"])]),
        );
        let session = grader.grade_all().await.unwrap();
        sessions.push(serde_json::to_string_pretty(&session).unwrap());
    }
    assert_eq!(sessions[0], sessions[1]);
}

#[tokio::test]
async fn saved_session_matches_the_results_format() {
    let gateway = FixedGateway::new("Base case present. Correct");
    let mut grader = grader_with(gateway, RECURSION_BANK);
    grader.add_submission("answers_judy.json", submission(&[("q1", &["stops at 0"])]));

    let session = grader.grade_all().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("grading_results.json");
    save_session(&session, &out).unwrap();

    let raw = std::fs::read_to_string(&out).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let outcome = &parsed["answers_judy.json"]["q1"];
    assert!(outcome["time"].is_number());
    assert_eq!(outcome["rates"], serde_json::json!([1.0]));
    assert_eq!(outcome["avg_rates"], serde_json::json!(1.0));
    assert!(outcome["test_history"].as_str().unwrap().contains("Prompt for test case"));
}
