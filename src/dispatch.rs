//! Agent dispatch: phase prompts out, typed artifacts back.
//!
//! The dispatcher translates a phase plus the accumulated context into a
//! request to the text-generation collaborator and strictly decodes the
//! returned payload into the matching artifact type. It performs no
//! caching and no retries of its own; retry policy belongs to the loop
//! controller, and correctness authority belongs to the self-audit scorer.

use crate::artifact::{
    AnalysisArtifact, CodeArtifact, HypothesisArtifact, Phase, PhaseArtifact, Request,
    ReviewArtifact,
};
use crate::collaborator::{CompletionError, TextCompletion};
use crate::error::DispatchError;
use crate::history::IterationHistory;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default upper bound on rendered prompt length in characters.
pub const DEFAULT_MAX_PROMPT_LEN: usize = 48_000;

/// Everything a phase prompt may reference.
///
/// Always includes the original request, the current analysis (absent only
/// for the very first ANALYZE), and the full prior iteration history so
/// prompts can reference past failures.
#[derive(Debug, Clone, Copy)]
pub struct ContextPackage<'a> {
    /// The original user request.
    pub request: &'a Request,
    /// The analysis in effect, if one exists yet.
    pub analysis: Option<&'a AnalysisArtifact>,
    /// All committed prior iterations.
    pub history: &'a IterationHistory,
    /// Refinement focus, set only when re-entering a phase after REFINE.
    pub specific_focus: Option<&'a str>,
    /// The candidate code under review (VALIDATE phase only).
    pub code: Option<&'a CodeArtifact>,
}

/// Routes a phase to the text-generation collaborator and parses the
/// structured response.
///
/// # Example
///
/// ```rust,ignore
/// use crucible::dispatch::{AgentDispatcher, ContextPackage};
///
/// let dispatcher = AgentDispatcher::new(completion);
/// let artifact = dispatcher.invoke(Phase::Analyze, &ctx).await?;
/// ```
pub struct AgentDispatcher {
    completion: Arc<dyn TextCompletion>,
    max_prompt_len: usize,
}

impl AgentDispatcher {
    /// Create a dispatcher over the given collaborator.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self {
            completion,
            max_prompt_len: DEFAULT_MAX_PROMPT_LEN,
        }
    }

    /// Override the prompt length bound.
    #[must_use]
    pub fn with_max_prompt_len(mut self, max_prompt_len: usize) -> Self {
        self.max_prompt_len = max_prompt_len;
        self
    }

    /// Invoke the collaborator for a phase and decode its reply.
    ///
    /// # Errors
    ///
    /// [`DispatchError::CollaboratorUnavailable`] when the collaborator
    /// cannot be reached; [`DispatchError::MalformedResponse`] when the
    /// reply does not decode into the phase's artifact schema.
    pub async fn invoke(
        &self,
        phase: Phase,
        ctx: &ContextPackage<'_>,
    ) -> Result<PhaseArtifact, DispatchError> {
        let prompt = self.render_prompt(phase, ctx)?;
        debug!(
            %phase,
            model = self.completion.model_name(),
            prompt_chars = prompt.len(),
            "dispatching phase"
        );

        let text = self.completion.complete(&prompt).await.map_err(
            |CompletionError::Unavailable(detail)| DispatchError::CollaboratorUnavailable {
                phase,
                detail,
            },
        )?;

        parse_phase_artifact(phase, &text)
    }

    /// Render the prompt for a phase: role instructions, required reply
    /// schema, and the serialized context package.
    fn render_prompt(
        &self,
        phase: Phase,
        ctx: &ContextPackage<'_>,
    ) -> Result<String, DispatchError> {
        let context_json = render_context(phase, ctx).map_err(|e| {
            DispatchError::MalformedResponse {
                phase,
                detail: format!("context serialization: {e}"),
            }
        })?;

        let prompt = format!(
            "{instructions}\n\nReply with a single JSON object matching this schema:\n{schema}\n\nContext:\n{context}\n",
            instructions = phase_instructions(phase),
            schema = phase_schema(phase),
            context = context_json,
        );

        Ok(truncate_prompt(prompt, self.max_prompt_len))
    }
}

/// Truncate an over-long prompt, keeping the head (instructions and
/// schema come first and must survive).
fn truncate_prompt(prompt: String, max_len: usize) -> String {
    if prompt.len() <= max_len {
        return prompt;
    }
    warn!(
        original_chars = prompt.len(),
        truncated_chars = max_len,
        "prompt truncated"
    );
    let mut cut = max_len;
    while !prompt.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut truncated = prompt[..cut].to_string();
    truncated.push_str("\n[context truncated]");
    truncated
}

fn render_context(phase: Phase, ctx: &ContextPackage<'_>) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct PromptContext<'a> {
        request: &'a Request,
        #[serde(skip_serializing_if = "Option::is_none")]
        analysis: Option<&'a AnalysisArtifact>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate: Option<&'a CodeArtifact>,
        #[serde(skip_serializing_if = "Option::is_none")]
        specific_focus: Option<&'a str>,
        prior_iterations: serde_json::Value,
    }

    // Past iterations matter for what failed, not for full artifact bodies.
    let prior: Vec<serde_json::Value> = ctx
        .history
        .iter()
        .map(|record| {
            json!({
                "index": record.index,
                "overall": record.overall,
                "decision": record.decision.decision,
                "failures": record.report.failures,
                "failed_examples": record
                    .report
                    .results
                    .iter()
                    .filter(|r| !r.passed)
                    .map(|r| &r.example_id)
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&PromptContext {
        request: ctx.request,
        analysis: ctx.analysis,
        candidate: if phase == Phase::Validate { ctx.code } else { None },
        specific_focus: ctx.specific_focus,
        prior_iterations: serde_json::Value::Array(prior),
    })
}

fn phase_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Analyze => {
            "You are the analysis agent. Extract the requirements, constraints, \
             input/output examples, risks, and open questions from the request. \
             Give every requirement a unique id and tag each example with the \
             requirement ids it exercises."
        }
        Phase::Hypothesize => {
            "You are the planning agent. Propose one implementation approach for \
             the analyzed request: the approach, its rationale, per-collaborator \
             task assignments, expected behavior, and edge cases. If prior \
             iterations failed, address their failures explicitly."
        }
        Phase::Code => {
            "You are the implementation agent. Produce the complete candidate \
             solution as a list of files with full contents, declared \
             dependencies, and implementation notes."
        }
        Phase::Validate => {
            "You are the quality audit agent. Review the candidate solution for \
             architecture violations and security vulnerabilities. Report \
             findings with category, severity, and location; do not re-run the \
             examples."
        }
    }
}

fn phase_schema(phase: Phase) -> &'static str {
    match phase {
        Phase::Analyze => {
            r#"{"requirements": [{"id": "R1", "text": "..."}], "constraints": [], "examples": [{"id": "E1", "input": "...", "expected_output": "...", "requirements": ["R1"]}], "risks": [], "open_questions": []}"#
        }
        Phase::Hypothesize => {
            r#"{"approach": "...", "rationale": "...", "assignments": [{"collaborator": "...", "goal": "..."}], "expected_behavior": "...", "edge_cases": []}"#
        }
        Phase::Code => {
            r#"{"files": [{"path": "...", "content": "..."}], "dependencies": [], "notes": "..."}"#
        }
        Phase::Validate => {
            r#"{"findings": [{"category": "architecture|security", "severity": "minor|major|critical", "location": "...", "description": "..."}], "suggestions": []}"#
        }
    }
}

/// Strictly decode a collaborator reply into the artifact for `phase`.
///
/// Tolerates a fenced ```json block or surrounding prose around a single
/// JSON object; anything that does not decode into the expected schema is
/// a [`DispatchError::MalformedResponse`].
pub fn parse_phase_artifact(phase: Phase, text: &str) -> Result<PhaseArtifact, DispatchError> {
    let payload = extract_json(text).ok_or_else(|| DispatchError::MalformedResponse {
        phase,
        detail: "no JSON object found in response".into(),
    })?;

    let malformed = |e: serde_json::Error| DispatchError::MalformedResponse {
        phase,
        detail: e.to_string(),
    };

    match phase {
        Phase::Analyze => serde_json::from_str::<AnalysisArtifact>(payload)
            .map(PhaseArtifact::Analysis)
            .map_err(malformed),
        Phase::Hypothesize => serde_json::from_str::<HypothesisArtifact>(payload)
            .map(PhaseArtifact::Hypothesis)
            .map_err(malformed),
        Phase::Code => serde_json::from_str::<CodeArtifact>(payload)
            .map(PhaseArtifact::Code)
            .map_err(malformed),
        Phase::Validate => serde_json::from_str::<ReviewArtifact>(payload)
            .map(PhaseArtifact::Review)
            .map_err(malformed),
    }
}

/// Locate the JSON payload inside a collaborator reply.
fn extract_json(text: &str) -> Option<&str> {
    // Prefer an explicit fence.
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    // Otherwise the outermost braces.
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(text[start..=end].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FailureCategory;
    use crate::testing::MockTextCompletion;

    fn request() -> Request {
        Request::new("reverse a string")
    }

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "the answer is {\"a\": 1} as requested";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_json_missing() {
        assert!(extract_json("no payload here").is_none());
    }

    #[test]
    fn test_parse_analysis_reply() {
        let reply = r#"{"requirements": [{"id": "R1", "text": "reverses"}], "examples": [{"id": "E1", "input": "ab", "expected_output": "ba", "requirements": ["R1"]}]}"#;
        let artifact = parse_phase_artifact(Phase::Analyze, reply).unwrap();
        let analysis = artifact.into_analysis().unwrap();
        assert_eq!(analysis.requirements.len(), 1);
        assert_eq!(analysis.examples[0].id, "E1");
    }

    #[test]
    fn test_parse_wrong_schema_is_malformed() {
        // A code-shaped reply does not satisfy the analyze schema.
        let reply = r#"{"files": [{"path": "main.rs", "content": ""}]}"#;
        let err = parse_phase_artifact(Phase::Analyze, reply).unwrap_err();
        assert!(matches!(err, DispatchError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_review_reply() {
        let reply = r#"{"findings": [{"category": "security", "severity": "critical", "description": "injection", "location": "main.rs"}], "suggestions": ["sanitize input"]}"#;
        let artifact = parse_phase_artifact(Phase::Validate, reply).unwrap();
        let review = artifact.into_review().unwrap();
        assert_eq!(review.findings[0].category, FailureCategory::Security);
    }

    #[test]
    fn test_truncate_prompt_keeps_head() {
        let prompt = "x".repeat(100);
        let truncated = truncate_prompt(prompt, 10);
        assert!(truncated.starts_with("xxxxxxxxxx"));
        assert!(truncated.ends_with("[context truncated]"));
    }

    #[tokio::test]
    async fn test_invoke_decodes_scripted_reply() {
        let completion = MockTextCompletion::new()
            .with_response(r#"{"approach": "two pointers", "rationale": "O(n)"}"#);
        let dispatcher = AgentDispatcher::new(Arc::new(completion));
        let req = request();
        let history = IterationHistory::new();
        let ctx = ContextPackage {
            request: &req,
            analysis: None,
            history: &history,
            specific_focus: None,
            code: None,
        };
        let artifact = dispatcher.invoke(Phase::Hypothesize, &ctx).await.unwrap();
        let hypothesis = artifact.into_hypothesis().unwrap();
        assert_eq!(hypothesis.approach, "two pointers");
    }

    #[tokio::test]
    async fn test_invoke_unavailable_collaborator() {
        let completion = MockTextCompletion::new().with_failures(1);
        let dispatcher = AgentDispatcher::new(Arc::new(completion));
        let req = request();
        let history = IterationHistory::new();
        let ctx = ContextPackage {
            request: &req,
            analysis: None,
            history: &history,
            specific_focus: None,
            code: None,
        };
        let err = dispatcher.invoke(Phase::Analyze, &ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::CollaboratorUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_prompt_includes_focus_and_prior_failures() {
        let completion = MockTextCompletion::new().with_response(r#"{"approach": "fix E2"}"#);
        let recorded = completion.recorded_prompts();
        let dispatcher = AgentDispatcher::new(Arc::new(completion));
        let req = request();
        let history = IterationHistory::new();
        let ctx = ContextPackage {
            request: &req,
            analysis: None,
            history: &history,
            specific_focus: Some("example E2"),
            code: None,
        };
        dispatcher.invoke(Phase::Hypothesize, &ctx).await.unwrap();
        let prompts = recorded.lock().unwrap();
        assert!(prompts[0].contains("example E2"));
        assert!(prompts[0].contains("reverse a string"));
    }
}
