//! Loop configuration and scoring weights.
//!
//! All knobs are optional with the defaults given below; `validate()`
//! rejects out-of-range values with field-specific errors before a run
//! starts, so the controller never has to re-check them mid-loop.

use crate::error::{CrucibleError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default confidence threshold for early finalization.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Default minimum requirements coverage for finalization.
pub const DEFAULT_REQUIREMENTS_COVERAGE_MIN: f64 = 0.9;

/// Default per-example execution timeout.
pub const DEFAULT_EXAMPLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on concurrent example executions.
pub const DEFAULT_VALIDATION_WORKERS: usize = 4;

/// Default delay before the single allowed dispatch retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(2000);

/// Weights for the composite audit score.
///
/// The overall score is the weighted average of the four component scores;
/// weights are normalized by their sum, so they need not add up to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of the per-example test score.
    pub tests: f64,
    /// Weight of the requirements-coverage score.
    pub requirements: f64,
    /// Weight of the architecture-compliance score.
    pub architecture: f64,
    /// Weight of the security score.
    pub security: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            tests: 0.4,
            requirements: 0.3,
            architecture: 0.2,
            security: 0.1,
        }
    }
}

impl ScoreWeights {
    /// Sum of all weights, used for normalization.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.tests + self.requirements + self.architecture + self.security
    }

    /// Validate that weights are non-negative and not all zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("weights.tests", self.tests),
            ("weights.requirements", self.requirements),
            ("weights.architecture", self.architecture),
            ("weights.security", self.security),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CrucibleError::invalid_config(
                    name,
                    "must be a non-negative finite number",
                ));
            }
        }
        if self.total() <= 0.0 {
            return Err(CrucibleError::invalid_config(
                "weights",
                "at least one weight must be positive",
            ));
        }
        Ok(())
    }
}

/// Configuration for a single loop run.
///
/// # Example
///
/// ```
/// use crucible::config::LoopConfig;
///
/// let config = LoopConfig::default()
///     .with_max_iterations(3)
///     .with_confidence_threshold(0.9);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum number of iterations before a forced finalize.
    pub max_iterations: u32,
    /// Overall score at which the loop may finalize early.
    pub confidence_threshold: f64,
    /// Minimum requirements coverage required to finalize.
    pub requirements_coverage_min: f64,
    /// When false, only a perfect score finalizes before the budget is spent.
    pub early_termination: bool,
    /// Composite score weights.
    pub weights: ScoreWeights,
    /// Per-example execution timeout.
    pub example_timeout: Duration,
    /// Bound on concurrent example executions within one VALIDATE phase.
    pub validation_workers: usize,
    /// Treat a stuck flag as grounds for an early FINALIZE_WITH_WARNINGS.
    pub finalize_on_stuck: bool,
    /// Override the refinement target: `Some(true)` always returns to
    /// ANALYZE, `Some(false)` always to HYPOTHESIZE, `None` follows the
    /// audit's analysis-defect flag.
    pub refine_restarts_analysis: Option<bool>,
    /// Delay before the single allowed dispatch retry.
    pub retry_backoff: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            requirements_coverage_min: DEFAULT_REQUIREMENTS_COVERAGE_MIN,
            early_termination: true,
            weights: ScoreWeights::default(),
            example_timeout: DEFAULT_EXAMPLE_TIMEOUT,
            validation_workers: DEFAULT_VALIDATION_WORKERS,
            finalize_on_stuck: false,
            refine_restarts_analysis: None,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl LoopConfig {
    /// Set the iteration budget.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the early-finalization confidence threshold.
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the minimum requirements coverage.
    #[must_use]
    pub fn with_requirements_coverage_min(mut self, min: f64) -> Self {
        self.requirements_coverage_min = min;
        self
    }

    /// Enable or disable threshold-based early termination.
    #[must_use]
    pub fn with_early_termination(mut self, enabled: bool) -> Self {
        self.early_termination = enabled;
        self
    }

    /// Set the composite score weights.
    #[must_use]
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the per-example execution timeout.
    #[must_use]
    pub fn with_example_timeout(mut self, timeout: Duration) -> Self {
        self.example_timeout = timeout;
        self
    }

    /// Set the bound on concurrent example executions.
    #[must_use]
    pub fn with_validation_workers(mut self, workers: usize) -> Self {
        self.validation_workers = workers;
        self
    }

    /// Escalate to FINALIZE_WITH_WARNINGS when progress stalls.
    #[must_use]
    pub fn with_finalize_on_stuck(mut self, enabled: bool) -> Self {
        self.finalize_on_stuck = enabled;
        self
    }

    /// Force the refinement target regardless of the audit's flag.
    #[must_use]
    pub fn with_refine_restarts_analysis(mut self, restarts: bool) -> Self {
        self.refine_restarts_analysis = Some(restarts);
        self
    }

    /// Set the delay before the single allowed dispatch retry.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Validate all fields, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(CrucibleError::invalid_config(
                "max_iterations",
                "must be at least 1",
            ));
        }
        if !self.confidence_threshold.is_finite()
            || self.confidence_threshold <= 0.0
            || self.confidence_threshold > 1.0
        {
            return Err(CrucibleError::invalid_config(
                "confidence_threshold",
                "must be in (0, 1]",
            ));
        }
        if !self.requirements_coverage_min.is_finite()
            || self.requirements_coverage_min < 0.0
            || self.requirements_coverage_min > 1.0
        {
            return Err(CrucibleError::invalid_config(
                "requirements_coverage_min",
                "must be in [0, 1]",
            ));
        }
        if self.validation_workers == 0 {
            return Err(CrucibleError::invalid_config(
                "validation_workers",
                "must be at least 1",
            ));
        }
        if self.example_timeout.is_zero() {
            return Err(CrucibleError::invalid_config(
                "example_timeout",
                "must be non-zero",
            ));
        }
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LoopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 5);
        assert!((config.confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert!((config.requirements_coverage_min - 0.9).abs() < f64::EPSILON);
        assert!(config.early_termination);
    }

    #[test]
    fn test_default_weights() {
        let weights = ScoreWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-9);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let config = LoopConfig::default().with_max_iterations(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(LoopConfig::default()
            .with_confidence_threshold(0.0)
            .validate()
            .is_err());
        assert!(LoopConfig::default()
            .with_confidence_threshold(1.5)
            .validate()
            .is_err());
        assert!(LoopConfig::default()
            .with_confidence_threshold(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_coverage_bounds() {
        assert!(LoopConfig::default()
            .with_requirements_coverage_min(-0.1)
            .validate()
            .is_err());
        assert!(LoopConfig::default()
            .with_requirements_coverage_min(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoreWeights {
            tests: -0.1,
            ..ScoreWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let weights = ScoreWeights {
            tests: 0.0,
            requirements: 0.0,
            architecture: 0.0,
            security: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = LoopConfig::default().with_validation_workers(0);
        assert!(config.validate().is_err());
    }
}
