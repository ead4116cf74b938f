//! Pass/fail classification of judged responses.
//!
//! The verdict prompt asks the model to conclude with a single word,
//! "Correct" or "Incorrect". Classification scans only the final window of
//! the response so incidental mentions of "correct" in the reasoning body
//! don't count, and matches whole tokens so "Incorrect" doesn't either.
//!
//! This is a deliberately fragile keyword heuristic kept behind one function
//! so a structured-output contract can replace it without touching the
//! sampling logic.

/// Characters of response tail considered for classification.
const TAIL_WINDOW: usize = 20;

/// Whether a raw model response counts as a passing verdict.
pub fn is_affirmative(response: &str) -> bool {
    let lower = response.to_lowercase();
    let tail_start = lower
        .char_indices()
        .rev()
        .nth(TAIL_WINDOW - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);

    lower[tail_start..]
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == "correct")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_correct_passes() {
        assert!(is_affirmative(
            "The answer covers the base case properly. Correct"
        ));
        assert!(is_affirmative("correct"));
        assert!(is_affirmative("Verdict: CORRECT."));
    }

    #[test]
    fn trailing_incorrect_fails() {
        assert!(!is_affirmative(
            "The answer never terminates on this input. Incorrect"
        ));
        assert!(!is_affirmative("incorrect"));
    }

    #[test]
    fn early_mention_outside_tail_is_ignored() {
        assert!(!is_affirmative(
            "The word correct appears here, but the final verdict for this case is: fail"
        ));
    }

    #[test]
    fn tail_window_is_anchored_at_the_end() {
        // "Correct" early plus a long tail of filler pushes it out of scope.
        let resp = format!("Correct{}", " filler words here galore");
        assert!(!is_affirmative(&resp));
    }

    #[test]
    fn short_responses_scan_whole_string() {
        assert!(is_affirmative("Correct"));
        assert!(!is_affirmative("No"));
    }

    #[test]
    fn multibyte_tails_do_not_panic() {
        assert!(!is_affirmative("résumé «наверное» 日本語テキスト"));
        assert!(is_affirmative("日本語テキスト correct"));
    }
}
