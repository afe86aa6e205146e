//! Canned artifacts and scripted collaborator replies.
//!
//! The reply builders produce the JSON a well-behaved text collaborator
//! would return for each phase, matched to a small sorting task: two
//! examples, one requirement. Scripting all four replies on a
//! [`MockTextCompletion`](super::MockTextCompletion) drives a full
//! iteration.

use crate::artifact::{AnalysisArtifact, IoExample, Requirement};
use serde_json::json;

/// The ANALYZE reply: one requirement covered by two examples.
#[must_use]
pub fn analysis_reply() -> String {
    json!({
        "requirements": [
            {"id": "R1", "text": "output is in ascending order"}
        ],
        "constraints": ["single pass over stdin"],
        "examples": [
            {
                "id": "E1",
                "input": "2 1",
                "expected_output": "1 2",
                "requirements": ["R1"]
            },
            {
                "id": "E2",
                "input": "3 1 2",
                "expected_output": "1 2 3",
                "requirements": ["R1"]
            }
        ],
        "risks": [],
        "open_questions": []
    })
    .to_string()
}

/// The HYPOTHESIZE reply.
#[must_use]
pub fn hypothesis_reply() -> String {
    json!({
        "approach": "parse integers from stdin, sort, join with spaces",
        "rationale": "comparison sort is sufficient at this input size",
        "assignments": [
            {"collaborator": "code-executor", "goal": "implement and run the sort"}
        ],
        "expected_behavior": "prints the input integers in ascending order",
        "edge_cases": ["already sorted input"]
    })
    .to_string()
}

/// The CODE reply.
#[must_use]
pub fn code_reply() -> String {
    json!({
        "files": [
            {
                "path": "main.rs",
                "content": "fn main() { /* sort stdin tokens */ }"
            }
        ],
        "dependencies": [],
        "notes": "no external crates needed"
    })
    .to_string()
}

/// A VALIDATE review reply with nothing to report.
#[must_use]
pub fn empty_review_reply() -> String {
    json!({"findings": [], "suggestions": []}).to_string()
}

/// A VALIDATE review reply carrying one critical security finding.
#[must_use]
pub fn security_review_reply() -> String {
    json!({
        "findings": [
            {
                "category": "security",
                "severity": "critical",
                "description": "shells out with unsanitized input",
                "location": "main.rs"
            }
        ],
        "suggestions": ["drop the shell invocation"]
    })
    .to_string()
}

/// The analysis the scripted [`analysis_reply`] decodes to.
#[must_use]
pub fn sample_analysis() -> AnalysisArtifact {
    AnalysisArtifact {
        requirements: vec![Requirement {
            id: "R1".to_string(),
            text: "output is in ascending order".to_string(),
        }],
        constraints: vec!["single pass over stdin".to_string()],
        examples: vec![
            IoExample::new("E1", "2 1", "1 2").covering("R1"),
            IoExample::new("E2", "3 1 2", "1 2 3").covering("R1"),
        ],
        risks: Vec::new(),
        open_questions: Vec::new(),
    }
}
