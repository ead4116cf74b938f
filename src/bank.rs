//! Master question bank and student submissions.
//!
//! The bank is the authoritative, instructor-defined question set; student
//! submissions are read-only inputs keyed by question id. Both are plain
//! JSON files - the grading core never trusts student-supplied instructions
//! or test cases, only the bank's.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading question banks or submission files.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed input in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Master question bank
// =============================================================================

/// Authoritative question definition. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterQuestion {
    pub id: u32,
    /// Prompt text shown to the student.
    pub text: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Discrete scenarios a single-instruction answer must satisfy. Empty
    /// for multi-part conceptual questions.
    #[serde(default)]
    pub testcases: Vec<String>,
}

impl MasterQuestion {
    /// Questions with test cases go through consensus voting; questions
    /// without go through qualitative feedback.
    pub fn has_testcases(&self) -> bool {
        !self.testcases.is_empty()
    }

    /// Bank key for this question, e.g. "q3".
    pub fn key(&self) -> String {
        format!("q{}", self.id)
    }
}

#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    questions: Vec<MasterQuestion>,
}

/// The loaded master question bank, indexed by `"q<id>"`.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: BTreeMap<String, MasterQuestion>,
}

impl QuestionBank {
    /// Load the bank from a JSON file. A bank that fails to parse is fatal
    /// for the run - there is nothing authoritative to grade against.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: BankFile =
            serde_json::from_str(&raw).map_err(|source| InputError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let mut questions = BTreeMap::new();
        for q in file.questions {
            questions.insert(q.key(), q);
        }
        Ok(Self { questions })
    }

    pub fn get(&self, question_id: &str) -> Option<&MasterQuestion> {
        self.questions.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.questions.contains_key(question_id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MasterQuestion)> {
        self.questions.iter()
    }
}

// =============================================================================
// Student submissions
// =============================================================================

/// One student's submitted content for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    /// One answer per instruction, in instruction order. May be shorter
    /// than the instruction list.
    #[serde(default)]
    pub answers: Vec<String>,
    /// For single-instruction questions, the test case the student selected
    /// in the notebook. Informational; grading always uses the bank's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testcases: Option<Vec<String>>,
}

/// Mapping from question id (`"q<id>"`) to submitted content.
pub type StudentSubmission = BTreeMap<String, SubmittedAnswer>;

/// Load one student's submission file. A malformed file is reported and
/// skipped by the caller; it never aborts the run.
pub fn load_submission(path: impl AsRef<Path>) -> Result<StudentSubmission, InputError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| InputError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover `answers_*.json` submission files in a directory, sorted by
/// file name so roster iteration order is stable across runs.
pub fn discover_submissions(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, InputError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| InputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("answers_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
