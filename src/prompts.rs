//! Prompt templates for LLM grading judgments.
//!
//! Domain logic for rendering evaluation prompts. Provider-agnostic.

use crate::gateway::Message;

/// Substituted for a missing answer in multi-part questions, so the grader
/// comments on the gap instead of crashing or silently skipping it.
pub const NO_ANSWER_PLACEHOLDER: &str = "[No answer provided]";

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the gateway.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// The full prompt text as recorded in evaluation traces.
    pub fn transcript(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// A prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

// =============================================================================
// Standard prompts
// =============================================================================

/// Per-test-case verdict prompt. The response must end with the single word
/// "Correct" or "Incorrect"; the tail-anchored classifier depends on that.
pub const TESTCASE_VERDICT: PromptTemplate = PromptTemplate {
    slug: "testcase_verdict_v1",
    system: "You are a teaching assistant evaluating a student's answer to a computer science question.",
    user: r#"Question instruction: "{instruction}"
Student's answer: "The student's explanation is: '{answer}'."

Your task is to determine if the student's answer correctly applies to the following test case: "{testcase}".

Think step-by-step and provide a brief explanation of why the student's answer succeeds or fails for this specific test case. Conclude your entire response with a single word: "Correct" if it succeeds, or "Incorrect" if it fails."#,
};

/// Guided-feedback prompt for multi-part conceptual questions. Reviews every
/// instruction/answer pair without revealing a model-correct answer.
pub const CONCEPTUAL_FEEDBACK: PromptTemplate = PromptTemplate {
    slug: "conceptual_feedback_v1",
    system: "You are a helpful teaching assistant providing feedback on a multi-part computer science question.",
    user: r#"Below are the instructions the student was given and their corresponding answers.

{context}

Your task is to:
1. Review all the student's answers in the context of the instructions.
2. Provide constructive feedback on each part.
3. Explain what they did well and where they can improve.
4. Do NOT give the direct, correct answer. Guide the student toward it.

Please provide your feedback now."#,
};

/// Render the per-test-case verdict prompt.
pub fn render_verdict(instruction: &str, answer: &str, testcase: &str) -> PromptInstance {
    let user = TESTCASE_VERDICT
        .user
        .replace("{instruction}", instruction)
        .replace("{answer}", answer)
        .replace("{testcase}", testcase);

    PromptInstance {
        template_slug: TESTCASE_VERDICT.slug.to_string(),
        system: TESTCASE_VERDICT.system.to_string(),
        user,
    }
}

/// Render the conceptual feedback prompt over every instruction/answer pair.
///
/// Answers may be shorter than instructions; missing entries get the explicit
/// placeholder text.
pub fn render_feedback(instructions: &[String], answers: &[String]) -> PromptInstance {
    let mut context = String::new();
    for (i, instruction) in instructions.iter().enumerate() {
        let answer = answers
            .get(i)
            .map(String::as_str)
            .unwrap_or(NO_ANSWER_PLACEHOLDER);
        context.push_str(&format!(
            "Instruction {n}: {instruction}\nStudent's Answer {n}: {answer}\n\n",
            n = i + 1,
        ));
    }

    PromptInstance {
        template_slug: CONCEPTUAL_FEEDBACK.slug.to_string(),
        system: CONCEPTUAL_FEEDBACK.system.to_string(),
        user: CONCEPTUAL_FEEDBACK
            .user
            .replace("{context}", context.trim_end()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
