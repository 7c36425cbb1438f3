// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The verifier phase's contract with the worker: a `VERDICT.json` file in
//! the project folder, with a fixed schema. Missing file, invalid JSON, and
//! a missing/non-boolean `approved` field are all distinct failure shapes
//! the verifier-reading caller needs to be able to report precisely.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const VERDICT_FILE_NAME: &str = "VERDICT.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub testing_done: String,
    #[serde(default)]
    pub results: String,
    #[serde(default)]
    pub criteria_met: Vec<String>,
    #[serde(default)]
    pub criteria_failed: Vec<String>,
    #[serde(default)]
    pub expert_comparison: String,
}

/// Outcome of reading the verifier's verdict: either approved, or rejected
/// with a reason — which may be the verifier's own feedback, or a
/// diagnostic describing why no usable verdict could be read at all.
pub struct VerdictOutcome {
    pub approved: bool,
    pub feedback: String,
}

/// Reads and validates `VERDICT.json` from `project_dir`. Never fails: every
/// malformed shape maps to a not-approved outcome carrying a diagnostic
/// feedback string, exactly as the worker loop needs it to keep iterating.
pub fn read_verdict(project_dir: &Path) -> VerdictOutcome {
    let path = project_dir.join(VERDICT_FILE_NAME);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            return VerdictOutcome {
                approved: false,
                feedback: "Verifier did not create VERDICT.json file".to_string(),
            }
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            return VerdictOutcome {
                approved: false,
                feedback: format!("Invalid JSON in VERDICT.json: {e}"),
            }
        }
    };

    let approved = match value.get("approved") {
        None => {
            return VerdictOutcome {
                approved: false,
                feedback: "Invalid VERDICT.json - missing 'approved' field".to_string(),
            }
        }
        Some(serde_json::Value::Bool(b)) => *b,
        Some(_) => {
            return VerdictOutcome {
                approved: false,
                feedback: "Invalid VERDICT.json - 'approved' must be boolean".to_string(),
            }
        }
    };

    if approved {
        return VerdictOutcome {
            approved: true,
            feedback: String::new(),
        };
    }

    let feedback = value
        .get("feedback")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("No feedback provided")
        .to_string();
    VerdictOutcome {
        approved: false,
        feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_approved_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = read_verdict(dir.path());
        assert!(!outcome.approved);
        assert!(outcome.feedback.contains("did not create"));
    }

    #[test]
    fn invalid_json_is_not_approved_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERDICT_FILE_NAME), "{not json").unwrap();
        let outcome = read_verdict(dir.path());
        assert!(!outcome.approved);
        assert!(outcome.feedback.contains("Invalid JSON"));
    }

    #[test]
    fn missing_approved_field_is_not_approved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERDICT_FILE_NAME), r#"{"feedback": "x"}"#).unwrap();
        let outcome = read_verdict(dir.path());
        assert!(!outcome.approved);
        assert!(outcome.feedback.contains("missing 'approved'"));
    }

    #[test]
    fn non_bool_approved_field_is_not_approved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERDICT_FILE_NAME), r#"{"approved": "yes"}"#).unwrap();
        let outcome = read_verdict(dir.path());
        assert!(!outcome.approved);
        assert!(outcome.feedback.contains("must be boolean"));
    }

    #[test]
    fn approved_true_wins_regardless_of_feedback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(VERDICT_FILE_NAME),
            r#"{"approved": true, "feedback": "looks good"}"#,
        )
        .unwrap();
        let outcome = read_verdict(dir.path());
        assert!(outcome.approved);
    }

    #[test]
    fn rejected_with_empty_feedback_defaults_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(VERDICT_FILE_NAME),
            r#"{"approved": false, "feedback": ""}"#,
        )
        .unwrap();
        let outcome = read_verdict(dir.path());
        assert!(!outcome.approved);
        assert_eq!(outcome.feedback, "No feedback provided");
    }
}
