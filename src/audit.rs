//! Self-audit scoring and termination decisions.
//!
//! Converts a validation report plus coverage and compliance signals into
//! a single composite score and a termination decision. Everything here is
//! a pure function of its inputs: re-scoring the same report with the same
//! weights always yields the same result, which is what makes the scorer
//! (not the stochastic collaborators) the authority on correctness.
//!
//! The decision policy is a strictly ordered guard list, first match wins:
//!
//! 1. Critical failure with no remaining iteration budget -> ABORT
//! 2. Perfect score with all gates clear -> FINALIZE
//! 3. Score at or above the confidence threshold, gates clear -> FINALIZE
//! 4. Iteration budget spent -> FINALIZE_WITH_WARNINGS
//! 5. Otherwise -> REFINE with guidance

use crate::artifact::{
    AnalysisArtifact, Failure, FailureCategory, FailureSeverity, ValidationReport,
};
use crate::config::{LoopConfig, ScoreWeights};
use serde::{Deserialize, Serialize};

/// Tolerance for floating-point score comparisons.
const SCORE_EPSILON: f64 = 1e-9;

/// Hard cap applied to the overall score when a security finding exists.
pub const SECURITY_SCORE_CAP: f64 = 0.49;

// ============================================================================
// Score breakdown
// ============================================================================

/// The component scores and their weighted composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// passed examples / total examples (0 when there are none).
    pub test_score: f64,
    /// covered requirements / total requirements (1 when there are none).
    pub requirements_score: f64,
    /// 1.0 with no violations, else 1 - violations/rules, floored at 0.
    pub architecture_score: f64,
    /// 1.0 unless a security finding exists, then 0.
    pub security_score: f64,
    /// Weighted average of the above, after hard gates, in [0.0, 1.0].
    pub overall: f64,
}

/// Compute the composite score for a validation report.
///
/// The analysis artifact supplies the requirement list and the per-example
/// coverage tags; a requirement counts as covered only when at least one
/// example tagged with it passed.
#[must_use]
pub fn score(
    report: &ValidationReport,
    analysis: &AnalysisArtifact,
    weights: &ScoreWeights,
) -> ScoreBreakdown {
    let total = report.total_count();
    let test_score = if total == 0 {
        0.0
    } else {
        report.passed_count() as f64 / total as f64
    };

    let requirements_score = requirements_coverage(report, analysis);

    let violations = report.count_category(FailureCategory::Architecture);
    let architecture_score = if violations == 0 {
        1.0
    } else if report.architecture_rules_checked == 0 {
        // Violations reported without locally-checked rules (review
        // findings only) floor the score outright.
        0.0
    } else {
        (1.0 - violations as f64 / f64::from(report.architecture_rules_checked)).max(0.0)
    };

    let security_score = if report.has_category(FailureCategory::Security) {
        0.0
    } else {
        1.0
    };

    let weighted = (weights.tests * test_score
        + weights.requirements * requirements_score
        + weights.architecture * architecture_score
        + weights.security * security_score)
        / weights.total();

    let mut overall = weighted.clamp(0.0, 1.0);
    if security_score == 0.0 {
        // Hard gate, not a weighted penalty.
        overall = overall.min(SECURITY_SCORE_CAP);
    }
    if report.has_category(FailureCategory::Compilation) {
        // A build failure zeroes the iteration regardless of partial output.
        overall = 0.0;
    }

    ScoreBreakdown {
        test_score,
        requirements_score,
        architecture_score,
        security_score,
        overall,
    }
}

/// Pass-based requirements coverage using explicit per-example tags.
fn requirements_coverage(report: &ValidationReport, analysis: &AnalysisArtifact) -> f64 {
    if analysis.requirements.is_empty() {
        // Nothing to cover.
        return 1.0;
    }
    let covered = analysis
        .requirements
        .iter()
        .filter(|req| {
            analysis.examples.iter().any(|ex| {
                ex.requirements.contains(&req.id)
                    && report
                        .results
                        .iter()
                        .any(|r| r.example_id == ex.id && r.passed)
            })
        })
        .count();
    covered as f64 / analysis.requirements.len() as f64
}

// ============================================================================
// Termination decisions
// ============================================================================

/// The audit's verdict for an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// All criteria met; emit the solution.
    Finalize,
    /// Budget or progress forced termination; emit the best candidate
    /// with accumulated failures as warnings.
    FinalizeWithWarnings,
    /// Loop back for another iteration.
    Refine,
    /// Unresolvable within budget; stop with the partial history.
    Abort,
}

impl Decision {
    /// Check whether this decision terminates the loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Refine)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finalize => write!(f, "finalize"),
            Self::FinalizeWithWarnings => write!(f, "finalize_with_warnings"),
            Self::Refine => write!(f, "refine"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Guidance attached to a REFINE decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementGuidance {
    /// Severity of the most serious unresolved failure.
    pub priority: FailureSeverity,
    /// What the next iteration should concentrate on.
    pub focus_areas: Vec<String>,
    /// Concrete suggested actions.
    pub suggested_actions: Vec<String>,
    /// Collaborator roles the refinement should involve.
    pub target_collaborators: Vec<String>,
    /// Iterations left in the budget.
    pub estimated_remaining_iterations: u32,
}

/// The complete audit outcome for one iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationDecision {
    /// The verdict.
    pub decision: Decision,
    /// The audit's composite score at decision time.
    pub confidence: f64,
    /// Human-readable reason for the verdict.
    pub reason: String,
    /// Present only on REFINE.
    pub guidance: Option<RefinementGuidance>,
    /// Set when the score failed to improve across consecutive refinements.
    pub stuck: bool,
    /// Set when the refinement should return to ANALYZE rather than
    /// HYPOTHESIZE (the analysis itself is defective).
    pub targets_analysis: bool,
}

impl TerminationDecision {
    /// Create a bare decision with no guidance or flags.
    #[must_use]
    pub fn simple(decision: Decision, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            decision,
            confidence,
            reason: reason.into(),
            guidance: None,
            stuck: false,
            targets_analysis: false,
        }
    }
}

/// Controller-supplied context for the decision policy.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext {
    /// Index of the iteration being audited (1-based).
    pub iteration_index: u32,
    /// Total iteration budget.
    pub max_iterations: u32,
    /// Overall score of the previous committed iteration, if any.
    pub previous_overall: Option<f64>,
}

impl AuditContext {
    /// Iterations left after the one being audited.
    #[must_use]
    pub fn remaining_iterations(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iteration_index)
    }
}

/// Apply the ordered decision policy to a scored iteration.
#[must_use]
pub fn decide(
    breakdown: &ScoreBreakdown,
    report: &ValidationReport,
    ctx: &AuditContext,
    config: &LoopConfig,
) -> TerminationDecision {
    let remaining = ctx.remaining_iterations();
    let has_critical = report.has_severity(FailureSeverity::Critical);
    let gates_clear = !report.has_category(FailureCategory::Architecture)
        && !report.has_severity(FailureSeverity::Critical)
        && !report.has_severity(FailureSeverity::Major)
        && breakdown.requirements_score + SCORE_EPSILON >= config.requirements_coverage_min;

    // Guard 1: critical failure that cannot be fixed within the budget.
    if has_critical && remaining == 0 {
        return TerminationDecision::simple(
            Decision::Abort,
            breakdown.overall,
            "critical failure with no remaining iteration budget",
        );
    }

    // Guard 2: perfect iteration.
    if breakdown.overall + SCORE_EPSILON >= 1.0 && gates_clear {
        return TerminationDecision::simple(
            Decision::Finalize,
            breakdown.overall,
            "all examples passed, all requirements covered, no failures",
        );
    }

    // Guard 3: confident enough, all gating conditions met.
    if config.early_termination
        && breakdown.overall + SCORE_EPSILON >= config.confidence_threshold
        && gates_clear
    {
        return TerminationDecision::simple(
            Decision::Finalize,
            breakdown.overall,
            format!(
                "overall {:.2} meets confidence threshold {:.2}",
                breakdown.overall, config.confidence_threshold
            ),
        );
    }

    // Guard 4: budget spent.
    if ctx.iteration_index >= ctx.max_iterations {
        return TerminationDecision::simple(
            Decision::FinalizeWithWarnings,
            breakdown.overall,
            format!(
                "iteration budget of {} spent with overall {:.2}",
                ctx.max_iterations, breakdown.overall
            ),
        );
    }

    // Guard 5: refine.
    let stuck = ctx
        .previous_overall
        .is_some_and(|prev| breakdown.overall <= prev + SCORE_EPSILON);
    TerminationDecision {
        decision: Decision::Refine,
        confidence: breakdown.overall,
        reason: format!(
            "overall {:.2} below threshold {:.2}",
            breakdown.overall, config.confidence_threshold
        ),
        guidance: Some(build_guidance(report, remaining)),
        stuck,
        targets_analysis: report.has_category(FailureCategory::Completeness),
    }
}

/// Populate refinement guidance from the highest-severity unresolved
/// failures, ties broken by earliest-reported.
fn build_guidance(report: &ValidationReport, remaining: u32) -> RefinementGuidance {
    let mut focus_areas: Vec<String> = report
        .results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("example {}", r.example_id))
        .collect();

    // Stable sort keeps report order within equal severities.
    let mut ranked: Vec<&Failure> = report.failures.iter().collect();
    ranked.sort_by(|a, b| b.severity.cmp(&a.severity));

    for failure in ranked.iter().take(3) {
        let area = match &failure.location {
            Some(location) => format!("{} at {}: {}", failure.category, location, failure.description),
            None => format!("{}: {}", failure.category, failure.description),
        };
        focus_areas.push(area);
    }

    let mut suggested_actions: Vec<String> =
        report.suggestions.iter().take(3).cloned().collect();
    if let Some(top) = ranked.first() {
        suggested_actions.push(category_action(top.category).to_string());
    }

    let mut target_collaborators: Vec<String> = Vec::new();
    for failure in &ranked {
        let role = category_collaborator(failure.category).to_string();
        if !target_collaborators.contains(&role) {
            target_collaborators.push(role);
        }
    }
    if target_collaborators.is_empty() {
        target_collaborators.push("code-executor".to_string());
    }

    RefinementGuidance {
        priority: report.worst_severity().unwrap_or(FailureSeverity::Minor),
        focus_areas,
        suggested_actions,
        target_collaborators,
        estimated_remaining_iterations: remaining,
    }
}

fn category_action(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::Compilation => "fix the build before anything else",
        FailureCategory::Timeout => "reduce candidate runtime or simplify the algorithm",
        FailureCategory::Architecture => "restore the declared layering and dependency direction",
        FailureCategory::Security => "remove the reported vulnerability",
        FailureCategory::Completeness => "revisit the analysis and add requirements and examples",
        FailureCategory::Correctness => "correct the output for the failing examples",
        FailureCategory::Dispatch => "re-run the failed phase with a narrower focus",
    }
}

fn category_collaborator(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::Correctness
        | FailureCategory::Compilation
        | FailureCategory::Timeout => "code-executor",
        FailureCategory::Architecture => "architect",
        FailureCategory::Security => "quality-auditor",
        FailureCategory::Completeness => "task-planner",
        FailureCategory::Dispatch => "orchestrator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{IoExample, Requirement, TestResult};

    fn analysis_with(examples: Vec<IoExample>, requirements: Vec<Requirement>) -> AnalysisArtifact {
        AnalysisArtifact {
            requirements,
            examples,
            ..Default::default()
        }
    }

    fn report_with(results: Vec<TestResult>, failures: Vec<Failure>) -> ValidationReport {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        ValidationReport {
            passed: failures.is_empty() && passed == total && total > 0,
            score: if total == 0 { 0.0 } else { passed as f64 / total as f64 },
            results,
            failures,
            suggestions: vec![],
            architecture_rules_checked: 0,
        }
    }

    fn ctx(iteration: u32, max: u32) -> AuditContext {
        AuditContext {
            iteration_index: iteration,
            max_iterations: max,
            previous_overall: None,
        }
    }

    #[test]
    fn test_perfect_score_finalizes() {
        // Scenario A: two passing examples, full coverage.
        let analysis = analysis_with(
            vec![
                IoExample::new("E1", "a", "1").covering("R1"),
                IoExample::new("E2", "b", "2").covering("R2"),
            ],
            vec![Requirement::new("R1", "one"), Requirement::new("R2", "two")],
        );
        let report = report_with(
            vec![TestResult::passed("E1", "1"), TestResult::passed("E2", "2")],
            vec![],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!((breakdown.overall - 1.0).abs() < SCORE_EPSILON);

        let decision = decide(&breakdown, &report, &ctx(1, 5), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Finalize);
    }

    #[test]
    fn test_one_failing_example_refines() {
        // Scenario B: 4 examples, 1 fails, one requirement per example.
        let analysis = analysis_with(
            (1..=4)
                .map(|i| {
                    IoExample::new(format!("E{i}"), format!("in{i}"), format!("out{i}"))
                        .covering(format!("R{i}"))
                })
                .collect(),
            (1..=4)
                .map(|i| Requirement::new(format!("R{i}"), format!("req {i}")))
                .collect(),
        );
        let report = report_with(
            vec![
                TestResult::passed("E1", "out1"),
                TestResult::failed("E2", "got outX"),
                TestResult::passed("E3", "out3"),
                TestResult::passed("E4", "out4"),
            ],
            vec![Failure::new(
                FailureCategory::Correctness,
                FailureSeverity::Major,
                "mismatch on E2",
            )
            .with_location("E2")],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!((breakdown.test_score - 0.75).abs() < SCORE_EPSILON);
        assert!((breakdown.requirements_score - 0.75).abs() < SCORE_EPSILON);
        assert!(breakdown.overall >= 0.70 && breakdown.overall <= 0.84);

        let decision = decide(&breakdown, &report, &ctx(1, 5), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Refine);
        let guidance = decision.guidance.expect("refine carries guidance");
        assert!(guidance
            .focus_areas
            .iter()
            .any(|area| area.contains("E2")));
    }

    #[test]
    fn test_compilation_failure_zeroes_overall() {
        // Scenario C.
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let report = report_with(
            vec![TestResult::failed("E1", "build failed")],
            vec![Failure::new(
                FailureCategory::Compilation,
                FailureSeverity::Major,
                "missing semicolon",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert_eq!(breakdown.overall, 0.0);

        let decision = decide(&breakdown, &report, &ctx(1, 5), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Refine);
    }

    #[test]
    fn test_security_finding_caps_overall() {
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let report = report_with(
            vec![TestResult::passed("E1", "1")],
            vec![Failure::new(
                FailureCategory::Security,
                FailureSeverity::Critical,
                "command injection",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!(breakdown.overall <= SECURITY_SCORE_CAP);
        assert_eq!(breakdown.security_score, 0.0);
    }

    #[test]
    fn test_zero_examples_scores_zero_tests() {
        let analysis = analysis_with(vec![], vec![Requirement::new("R1", "one")]);
        let report = report_with(
            vec![],
            vec![Failure::new(
                FailureCategory::Completeness,
                FailureSeverity::Major,
                "no examples to validate against",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert_eq!(breakdown.test_score, 0.0);
        assert_eq!(breakdown.requirements_score, 0.0);

        let decision = decide(&breakdown, &report, &ctx(1, 5), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Refine);
        assert!(decision.targets_analysis);
    }

    #[test]
    fn test_no_requirements_counts_as_full_coverage() {
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let report = report_with(vec![TestResult::passed("E1", "1")], vec![]);
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert_eq!(breakdown.requirements_score, 1.0);
    }

    #[test]
    fn test_architecture_score_partial() {
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let mut report = report_with(
            vec![TestResult::passed("E1", "1")],
            vec![Failure::new(
                FailureCategory::Architecture,
                FailureSeverity::Major,
                "ui imports storage",
            )],
        );
        report.architecture_rules_checked = 4;
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!((breakdown.architecture_score - 0.75).abs() < SCORE_EPSILON);
    }

    #[test]
    fn test_budget_spent_forces_finalize_with_warnings() {
        // Scenario D shape: below threshold at the final iteration.
        let analysis = analysis_with(
            vec![IoExample::new("E1", "a", "1"), IoExample::new("E2", "b", "2")],
            vec![],
        );
        let report = report_with(
            vec![TestResult::passed("E1", "1"), TestResult::failed("E2", "nope")],
            vec![Failure::new(
                FailureCategory::Correctness,
                FailureSeverity::Major,
                "wrong output",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!(breakdown.overall < 0.85);

        let decision = decide(&breakdown, &report, &ctx(2, 2), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::FinalizeWithWarnings);
    }

    #[test]
    fn test_critical_at_budget_end_aborts() {
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let report = report_with(
            vec![TestResult::failed("E1", "boom")],
            vec![Failure::new(
                FailureCategory::Security,
                FailureSeverity::Critical,
                "hardcoded credentials",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        let decision = decide(&breakdown, &report, &ctx(2, 2), &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Abort);
    }

    #[test]
    fn test_stuck_flag_on_non_increasing_overall() {
        // Scenario E: previous 0.6, current below it.
        let analysis = analysis_with(
            vec![IoExample::new("E1", "a", "1"), IoExample::new("E2", "b", "2")],
            vec![],
        );
        let report = report_with(
            vec![TestResult::passed("E1", "1"), TestResult::failed("E2", "nope")],
            vec![Failure::new(
                FailureCategory::Correctness,
                FailureSeverity::Major,
                "wrong output",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        let mut context = ctx(2, 5);
        context.previous_overall = Some(breakdown.overall + 0.05);
        let decision = decide(&breakdown, &report, &context, &LoopConfig::default());
        assert_eq!(decision.decision, Decision::Refine);
        assert!(decision.stuck);
    }

    #[test]
    fn test_improving_overall_is_not_stuck() {
        let analysis = analysis_with(
            vec![IoExample::new("E1", "a", "1"), IoExample::new("E2", "b", "2")],
            vec![],
        );
        let report = report_with(
            vec![TestResult::passed("E1", "1"), TestResult::failed("E2", "nope")],
            vec![Failure::new(
                FailureCategory::Correctness,
                FailureSeverity::Major,
                "wrong output",
            )],
        );
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        let mut context = ctx(2, 5);
        context.previous_overall = Some(breakdown.overall - 0.2);
        let decision = decide(&breakdown, &report, &context, &LoopConfig::default());
        assert!(!decision.stuck);
    }

    #[test]
    fn test_early_termination_disabled_blocks_guard_three() {
        let analysis = analysis_with(
            vec![
                IoExample::new("E1", "a", "1"),
                IoExample::new("E2", "b", "2"),
                IoExample::new("E3", "c", "3"),
            ],
            vec![],
        );
        // Only a minor failure: gates clear, score just under perfect.
        let report = ValidationReport {
            results: vec![
                TestResult::passed("E1", "1"),
                TestResult::passed("E2", "2"),
                TestResult::failed("E3", "off by one"),
            ],
            passed: false,
            score: 2.0 / 3.0,
            failures: vec![Failure::new(
                FailureCategory::Correctness,
                FailureSeverity::Minor,
                "off by one",
            )],
            suggestions: vec![],
            architecture_rules_checked: 0,
        };
        let breakdown = score(&report, &analysis, &ScoreWeights::default());
        assert!(breakdown.overall >= 0.85);

        let with_early = decide(&breakdown, &report, &ctx(1, 5), &LoopConfig::default());
        assert_eq!(with_early.decision, Decision::Finalize);

        let config = LoopConfig::default().with_early_termination(false);
        let without = decide(&breakdown, &report, &ctx(1, 5), &config);
        assert_eq!(without.decision, Decision::Refine);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let analysis = analysis_with(
            vec![IoExample::new("E1", "a", "1").covering("R1")],
            vec![Requirement::new("R1", "one")],
        );
        let report = report_with(vec![TestResult::passed("E1", "1")], vec![]);
        let first = score(&report, &analysis, &ScoreWeights::default());
        let second = score(&report, &analysis, &ScoreWeights::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_score_bounded() {
        let analysis = analysis_with(vec![IoExample::new("E1", "a", "1")], vec![]);
        let report = report_with(vec![TestResult::passed("E1", "1")], vec![]);
        let heavy = ScoreWeights {
            tests: 100.0,
            requirements: 0.0,
            architecture: 0.0,
            security: 0.0,
        };
        let breakdown = score(&report, &analysis, &heavy);
        assert!(breakdown.overall >= 0.0 && breakdown.overall <= 1.0);
    }

    #[test]
    fn test_guidance_targets_by_category() {
        let report = report_with(
            vec![TestResult::failed("E1", "nope")],
            vec![
                Failure::new(
                    FailureCategory::Architecture,
                    FailureSeverity::Major,
                    "layering",
                ),
                Failure::new(
                    FailureCategory::Correctness,
                    FailureSeverity::Major,
                    "mismatch",
                ),
            ],
        );
        let guidance = build_guidance(&report, 3);
        assert_eq!(guidance.priority, FailureSeverity::Major);
        assert!(guidance.target_collaborators.contains(&"architect".to_string()));
        assert!(guidance
            .target_collaborators
            .contains(&"code-executor".to_string()));
        assert_eq!(guidance.estimated_remaining_iterations, 3);
    }
}
