//! Artifact types produced by the four loop phases.
//!
//! Each phase of the ANALYZE -> HYPOTHESIZE -> CODE -> VALIDATE loop emits
//! exactly one artifact. Artifacts are immutable values: refinement
//! supersedes an artifact with a new one, never edits it in place, which
//! is what makes the iteration history a usable audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Phases
// ============================================================================

/// A stage in the iterative loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Extract requirements, constraints, examples, and risks.
    Analyze,
    /// Propose an approach with rationale and task assignments.
    Hypothesize,
    /// Produce the candidate solution files.
    Code,
    /// Review the candidate for architecture and security findings.
    Validate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Analyze => write!(f, "analyze"),
            Phase::Hypothesize => write!(f, "hypothesize"),
            Phase::Code => write!(f, "code"),
            Phase::Validate => write!(f, "validate"),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// The original user-supplied problem statement.
///
/// Immutable once accepted; every iteration sees the same request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique identifier for this run.
    pub id: Uuid,
    /// The problem statement.
    pub problem: String,
    /// Free-form contextual constraints supplied by the caller.
    pub constraints: Vec<String>,
    /// When the request was accepted.
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    /// Create a new request from a problem statement.
    #[must_use]
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem: problem.into(),
            constraints: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    /// Add a contextual constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// A single requirement extracted during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Unique identifier (e.g., "R1").
    pub id: String,
    /// The requirement text.
    pub text: String,
}

impl Requirement {
    /// Create a new requirement.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// An input/expected-output pair used as ground truth for scoring.
///
/// The `requirements` field carries explicit coverage tags: a requirement
/// counts as covered only when at least one example tagged with it passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoExample {
    /// Unique identifier (e.g., "E1").
    pub id: String,
    /// Input fed to the candidate solution.
    pub input: String,
    /// Expected output.
    pub expected_output: String,
    /// Requirement ids this example exercises.
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl IoExample {
    /// Create a new example pair.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        input: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            expected_output: expected_output.into(),
            requirements: Vec::new(),
        }
    }

    /// Tag this example as exercising a requirement.
    #[must_use]
    pub fn covering(mut self, requirement_id: impl Into<String>) -> Self {
        self.requirements.push(requirement_id.into());
        self
    }
}

/// Output of the ANALYZE phase.
///
/// Created once per iteration; may be carried forward unchanged across
/// REFINE iterations unless the refinement targets the analysis itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    /// Ordered requirements, each with a unique identifier.
    pub requirements: Vec<Requirement>,
    /// Constraints that bound the solution space.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Ground-truth input/output pairs.
    #[serde(default)]
    pub examples: Vec<IoExample>,
    /// Identified risks.
    #[serde(default)]
    pub risks: Vec<String>,
    /// Open clarification questions.
    #[serde(default)]
    pub open_questions: Vec<String>,
}

// ============================================================================
// Hypothesis
// ============================================================================

/// A collaborator/sub-goal pairing inside a hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// Target collaborator role (e.g., "api", "caching", "executor").
    pub collaborator: String,
    /// The sub-goal assigned to it.
    pub goal: String,
}

/// Output of the HYPOTHESIZE phase.
///
/// Superseded, never mutated, on refinement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HypothesisArtifact {
    /// Natural-language approach description.
    pub approach: String,
    /// Why this approach should work.
    #[serde(default)]
    pub rationale: String,
    /// Per-collaborator sub-goals.
    #[serde(default)]
    pub assignments: Vec<TaskAssignment>,
    /// Expected behavior of the resulting solution.
    #[serde(default)]
    pub expected_behavior: String,
    /// Enumerated edge cases the solution must handle.
    #[serde(default)]
    pub edge_cases: Vec<String>,
}

// ============================================================================
// Code
// ============================================================================

/// A produced file, identified by path with opaque content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the solution root.
    pub path: String,
    /// File content.
    pub content: String,
}

impl SourceFile {
    /// Create a new source file.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Output of the CODE phase.
///
/// Immutable once produced; each iteration creates a new artifact rather
/// than editing a previous one, preserving auditability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeArtifact {
    /// Produced files and changes.
    pub files: Vec<SourceFile>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form implementation notes.
    #[serde(default)]
    pub notes: String,
}

impl CodeArtifact {
    /// Total number of produced files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Severity of a recorded failure.
///
/// Ordered: `Minor < Major < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    /// Cosmetic or low-impact issue.
    Minor,
    /// Functional defect that must be fixed before finalizing.
    Major,
    /// Must be resolved or the run aborts once the budget is gone.
    Critical,
}

impl FailureSeverity {
    /// Check if this severity blocks a FINALIZE decision.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Major | Self::Critical)
    }
}

impl std::fmt::Display for FailureSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Wrong output for an example, or a runtime execution error.
    Correctness,
    /// The candidate did not build; forces score 0 for the iteration.
    Compilation,
    /// A per-example execution exceeded its time budget.
    Timeout,
    /// A compliance rule (layering, dependency direction) was violated.
    Architecture,
    /// A collaborator-reported vulnerability; triggers the hard score cap.
    Security,
    /// The analysis itself is unverifiable (e.g., zero examples).
    Completeness,
    /// A phase-level collaborator fault absorbed into the iteration.
    Dispatch,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Correctness => "correctness",
            Self::Compilation => "compilation",
            Self::Timeout => "timeout",
            Self::Architecture => "architecture",
            Self::Security => "security",
            Self::Completeness => "completeness",
            Self::Dispatch => "dispatch",
        };
        write!(f, "{}", s)
    }
}

/// A single failure recorded during validation or review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    /// What kind of failure this is.
    pub category: FailureCategory,
    /// How serious it is.
    pub severity: FailureSeverity,
    /// Where it was observed (example id, rule name, file path).
    #[serde(default)]
    pub location: Option<String>,
    /// Human-readable description.
    pub description: String,
    /// Requirement id this failure traces to, if known.
    #[serde(default)]
    pub requirement: Option<String>,
}

impl Failure {
    /// Create a new failure.
    #[must_use]
    pub fn new(
        category: FailureCategory,
        severity: FailureSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            location: None,
            description: description.into(),
            requirement: None,
        }
    }

    /// Add a location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Trace this failure to a requirement.
    #[must_use]
    pub fn for_requirement(mut self, requirement_id: impl Into<String>) -> Self {
        self.requirement = Some(requirement_id.into());
        self
    }
}

/// Result of running one example against the candidate solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Identifier of the example this result belongs to.
    pub example_id: String,
    /// Whether actual output matched expected output.
    pub passed: bool,
    /// Actual output on success/mismatch, or failure detail.
    pub detail: String,
}

impl TestResult {
    /// Create a passing result with the actual output.
    #[must_use]
    pub fn passed(example_id: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            example_id: example_id.into(),
            passed: true,
            detail: actual.into(),
        }
    }

    /// Create a failing result with the failure detail.
    #[must_use]
    pub fn failed(example_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            example_id: example_id.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Output of the VALIDATE phase: per-example results plus failures.
///
/// Produced fresh each iteration; the reported `score` is derived solely
/// from this report's own results and is never mutated retroactively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Per-example test results, ordered by example id.
    pub results: Vec<TestResult>,
    /// True when every example passed and no failure was recorded.
    pub passed: bool,
    /// Raw test score in [0.0, 1.0] (passed / total; 0 on build failure).
    pub score: f64,
    /// Recorded failures across all categories.
    pub failures: Vec<Failure>,
    /// Free-text improvement suggestions.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Number of compliance rules evaluated for this report.
    #[serde(default)]
    pub architecture_rules_checked: u32,
}

impl ValidationReport {
    /// Number of examples that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Total number of examples evaluated.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// Check whether any failure of the given category was recorded.
    #[must_use]
    pub fn has_category(&self, category: FailureCategory) -> bool {
        self.failures.iter().any(|f| f.category == category)
    }

    /// Count failures of the given category.
    #[must_use]
    pub fn count_category(&self, category: FailureCategory) -> usize {
        self.failures
            .iter()
            .filter(|f| f.category == category)
            .count()
    }

    /// Check whether any failure of the given severity was recorded.
    #[must_use]
    pub fn has_severity(&self, severity: FailureSeverity) -> bool {
        self.failures.iter().any(|f| f.severity == severity)
    }

    /// The worst severity present, if any failure was recorded.
    #[must_use]
    pub fn worst_severity(&self) -> Option<FailureSeverity> {
        self.failures.iter().map(|f| f.severity).max()
    }

    /// Merge collaborator-reported review findings into this report.
    ///
    /// Review findings never change individual test results; they only
    /// extend the failure list and suggestions.
    pub fn merge_review(&mut self, review: ReviewArtifact) {
        if !review.findings.is_empty() {
            self.passed = false;
        }
        self.failures.extend(review.findings);
        self.suggestions.extend(review.suggestions);
    }
}

/// Output of the VALIDATE-phase review dispatch: findings the text
/// collaborator reports against the candidate (architecture and security),
/// merged into the runner's [`ValidationReport`] before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewArtifact {
    /// Reported findings.
    #[serde(default)]
    pub findings: Vec<Failure>,
    /// Improvement suggestions.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

// ============================================================================
// Phase artifact envelope
// ============================================================================

/// The decoded output of a single dispatcher invocation.
#[derive(Debug, Clone)]
pub enum PhaseArtifact {
    /// ANALYZE output.
    Analysis(AnalysisArtifact),
    /// HYPOTHESIZE output.
    Hypothesis(HypothesisArtifact),
    /// CODE output.
    Code(CodeArtifact),
    /// VALIDATE review output.
    Review(ReviewArtifact),
}

impl PhaseArtifact {
    /// The phase that produced this artifact.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Analysis(_) => Phase::Analyze,
            Self::Hypothesis(_) => Phase::Hypothesize,
            Self::Code(_) => Phase::Code,
            Self::Review(_) => Phase::Validate,
        }
    }

    /// Unwrap as an analysis artifact.
    #[must_use]
    pub fn into_analysis(self) -> Option<AnalysisArtifact> {
        match self {
            Self::Analysis(a) => Some(a),
            _ => None,
        }
    }

    /// Unwrap as a hypothesis artifact.
    #[must_use]
    pub fn into_hypothesis(self) -> Option<HypothesisArtifact> {
        match self {
            Self::Hypothesis(h) => Some(h),
            _ => None,
        }
    }

    /// Unwrap as a code artifact.
    #[must_use]
    pub fn into_code(self) -> Option<CodeArtifact> {
        match self {
            Self::Code(c) => Some(c),
            _ => None,
        }
    }

    /// Unwrap as a review artifact.
    #[must_use]
    pub fn into_review(self) -> Option<ReviewArtifact> {
        match self {
            Self::Review(r) => Some(r),
            _ => None,
        }
    }
}
