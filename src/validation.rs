//! Validation runner: candidate execution against ground-truth examples.
//!
//! Runs the candidate solution against every input/output example through
//! the injected build/execute collaborator, plus structural compliance
//! checks, and produces the iteration's [`ValidationReport`].
//!
//! Per-example executions share no mutable state and run concurrently,
//! bounded by a worker limit; results are merged deterministically by
//! example id before scoring.

use crate::artifact::{
    CodeArtifact, Failure, FailureCategory, FailureSeverity, IoExample, TestResult,
    ValidationReport,
};
use crate::collaborator::{CodeExecutor, ExecError};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Equivalence predicate for comparing actual vs. expected output.
#[derive(Clone)]
pub enum OutputMatcher {
    /// Trimmed exact match (the default).
    Exact,
    /// Caller-supplied predicate: `(expected, actual) -> bool`.
    Predicate(Arc<dyn Fn(&str, &str) -> bool + Send + Sync>),
}

impl OutputMatcher {
    /// Check whether the actual output satisfies the expected output.
    #[must_use]
    pub fn matches(&self, expected: &str, actual: &str) -> bool {
        match self {
            Self::Exact => expected.trim() == actual.trim(),
            Self::Predicate(pred) => pred(expected, actual),
        }
    }
}

impl std::fmt::Debug for OutputMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "OutputMatcher::Exact"),
            Self::Predicate(_) => write!(f, "OutputMatcher::Predicate"),
        }
    }
}

/// A structural check evaluated against the code artifact, independent of
/// example tests. Violations contribute Architecture failures, never the
/// pass/fail of individual test results.
pub trait ComplianceRule: Send + Sync {
    /// Rule name, used as the failure location.
    fn name(&self) -> &str;

    /// Returns a violation description, or `None` when compliant.
    fn check(&self, code: &CodeArtifact) -> Option<String>;
}

/// Compliance rule: every declared dependency must come from an allowlist.
///
/// A stand-in for dependency-direction constraints in hosts that pin the
/// candidate to a vetted set of crates.
#[derive(Debug, Clone)]
pub struct DependencyAllowlistRule {
    allowed: Vec<String>,
}

impl DependencyAllowlistRule {
    /// Create a rule allowing exactly the given dependencies.
    #[must_use]
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }
}

impl ComplianceRule for DependencyAllowlistRule {
    fn name(&self) -> &str {
        "dependency-allowlist"
    }

    fn check(&self, code: &CodeArtifact) -> Option<String> {
        let undeclared: Vec<&str> = code
            .dependencies
            .iter()
            .filter(|dep| !self.allowed.contains(dep))
            .map(String::as_str)
            .collect();
        if undeclared.is_empty() {
            None
        } else {
            Some(format!(
                "dependencies outside the allowlist: {}",
                undeclared.join(", ")
            ))
        }
    }
}

/// Outcome of running a single example, before merging.
struct ExampleOutcome {
    result: TestResult,
    failure: Option<Failure>,
    build_failure: Option<String>,
}

/// Executes a code artifact against examples and compliance rules.
///
/// # Example
///
/// ```rust,ignore
/// use crucible::validation::ValidationRunner;
///
/// let runner = ValidationRunner::new(executor)
///     .with_timeout(Duration::from_secs(30))
///     .with_workers(8);
/// let report = runner.validate(&code, &examples, &rules).await;
/// ```
pub struct ValidationRunner {
    executor: Arc<dyn CodeExecutor>,
    timeout: Duration,
    workers: usize,
    matcher: OutputMatcher,
}

impl ValidationRunner {
    /// Create a runner with default timeout (60 s) and worker bound (4).
    #[must_use]
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            executor,
            timeout: crate::config::DEFAULT_EXAMPLE_TIMEOUT,
            workers: crate::config::DEFAULT_VALIDATION_WORKERS,
            matcher: OutputMatcher::Exact,
        }
    }

    /// Set the per-example execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the bound on concurrent example executions.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the output equivalence predicate.
    #[must_use]
    pub fn with_matcher(mut self, matcher: OutputMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Run the candidate against every example plus the compliance rules.
    ///
    /// The first example doubles as a build probe and runs alone: if it
    /// hits a build error, the remaining examples are never executed and
    /// the report carries a single Compilation failure, every result
    /// marked failed, and score 0. Once the probe clears, the rest run
    /// concurrently, and a per-example timeout fails that example without
    /// blocking the others.
    pub async fn validate(
        &self,
        code: &CodeArtifact,
        examples: &[IoExample],
        rules: &[Box<dyn ComplianceRule>],
    ) -> ValidationReport {
        let mut failures: Vec<Failure> = Vec::new();

        // Compliance checks are independent of example execution.
        for rule in rules {
            if let Some(violation) = rule.check(code) {
                warn!(rule = rule.name(), %violation, "compliance violation");
                failures.push(
                    Failure::new(
                        FailureCategory::Architecture,
                        FailureSeverity::Major,
                        violation,
                    )
                    .with_location(rule.name()),
                );
            }
        }

        let Some((first, rest)) = examples.split_first() else {
            // An analysis with zero examples cannot be validated.
            failures.push(Failure::new(
                FailureCategory::Completeness,
                FailureSeverity::Major,
                "analysis supplied zero input/output examples",
            ));
            return ValidationReport {
                results: Vec::new(),
                passed: false,
                score: 0.0,
                failures,
                suggestions: Vec::new(),
                architecture_rules_checked: rules.len() as u32,
            };
        };

        let probe = self.run_example(code, first).await;
        if let Some(detail) = &probe.build_failure {
            debug!(%detail, "build failure short-circuits validation");
            return self.build_failure_report(examples, failures, rules, detail.clone());
        }

        let mut outcomes: Vec<ExampleOutcome> = stream::iter(rest)
            .map(|example| self.run_example(code, example))
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .boxed()
            .await;
        outcomes.push(probe);

        // Deterministic merge regardless of completion order.
        outcomes.sort_by(|a, b| a.result.example_id.cmp(&b.result.example_id));

        // A build that only breaks mid-pool still collapses the report.
        if let Some(detail) = outcomes.iter().find_map(|o| o.build_failure.clone()) {
            debug!(%detail, "build failure short-circuits validation");
            return self.build_failure_report(examples, failures, rules, detail);
        }

        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(failure) = outcome.failure {
                failures.push(failure);
            }
            results.push(outcome.result);
        }

        let total = results.len();
        let passed_count = results.iter().filter(|r| r.passed).count();
        ValidationReport {
            passed: passed_count == total && failures.is_empty(),
            score: passed_count as f64 / total as f64,
            results,
            failures,
            suggestions: Vec::new(),
            architecture_rules_checked: rules.len() as u32,
        }
    }

    /// The collapsed report for a candidate that did not build.
    fn build_failure_report(
        &self,
        examples: &[IoExample],
        mut failures: Vec<Failure>,
        rules: &[Box<dyn ComplianceRule>],
        detail: String,
    ) -> ValidationReport {
        let results = examples
            .iter()
            .map(|ex| TestResult::failed(&ex.id, "build failed"))
            .collect();
        failures.push(Failure::new(
            FailureCategory::Compilation,
            FailureSeverity::Major,
            detail,
        ));
        ValidationReport {
            results,
            passed: false,
            score: 0.0,
            failures,
            suggestions: Vec::new(),
            architecture_rules_checked: rules.len() as u32,
        }
    }

    /// Execute one example with the configured timeout.
    async fn run_example(&self, code: &CodeArtifact, example: &IoExample) -> ExampleOutcome {
        let execution = self.executor.run(code, &example.input);
        match tokio::time::timeout(self.timeout, execution).await {
            Err(_) => {
                let detail = format!(
                    "timed out after {} ms",
                    self.timeout.as_millis()
                );
                ExampleOutcome {
                    result: TestResult::failed(&example.id, &detail),
                    failure: Some(
                        Failure::new(FailureCategory::Timeout, FailureSeverity::Major, detail)
                            .with_location(&example.id),
                    ),
                    build_failure: None,
                }
            }
            Ok(Err(ExecError::Build { detail })) => ExampleOutcome {
                result: TestResult::failed(&example.id, "build failed"),
                failure: None,
                build_failure: Some(detail),
            },
            Ok(Err(ExecError::Execution { detail })) => ExampleOutcome {
                result: TestResult::failed(&example.id, &detail),
                failure: Some(
                    Failure::new(
                        FailureCategory::Correctness,
                        FailureSeverity::Major,
                        detail,
                    )
                    .with_location(&example.id),
                ),
                build_failure: None,
            },
            Ok(Ok(output)) => {
                if output.exit_status != 0 {
                    let detail = format!(
                        "exit status {}: {}",
                        output.exit_status, output.stdout
                    );
                    return ExampleOutcome {
                        result: TestResult::failed(&example.id, &detail),
                        failure: Some(
                            Failure::new(
                                FailureCategory::Correctness,
                                FailureSeverity::Major,
                                detail,
                            )
                            .with_location(&example.id),
                        ),
                        build_failure: None,
                    };
                }
                if self.matcher.matches(&example.expected_output, &output.stdout) {
                    ExampleOutcome {
                        result: TestResult::passed(&example.id, output.stdout),
                        failure: None,
                        build_failure: None,
                    }
                } else {
                    // Actual output captured verbatim.
                    ExampleOutcome {
                        result: TestResult::failed(&example.id, &output.stdout),
                        failure: Some(
                            Failure::new(
                                FailureCategory::Correctness,
                                FailureSeverity::Major,
                                format!(
                                    "expected {:?}, got {:?}",
                                    example.expected_output, output.stdout
                                ),
                            )
                            .with_location(&example.id),
                        ),
                        build_failure: None,
                    }
                }
            }
        }
    }
}
