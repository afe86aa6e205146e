//! Loop state machine types and final outcomes.

use crate::artifact::{CodeArtifact, Failure, Phase, ValidationReport};
use crate::history::IterationHistory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// States of the loop controller's internal state machine.
///
/// ```text
/// ANALYZING -> HYPOTHESIZING -> CODING -> VALIDATING -> AUDITING
///      ^              ^                                    |
///      |              |                                    v
///      +--------------+------------ REFINING <---- {FINALIZED, ABORTED}
/// ```
///
/// `REFINING` transitions back to `HYPOTHESIZING` by default, or to
/// `ANALYZING` when the audit flags the analysis itself as defective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Running the ANALYZE phase.
    Analyzing,
    /// Running the HYPOTHESIZE phase.
    Hypothesizing,
    /// Running the CODE phase.
    Coding,
    /// Running the VALIDATE phase (runner plus review dispatch).
    Validating,
    /// Scoring and deciding.
    Auditing,
    /// Preparing the next iteration after a REFINE decision.
    Refining,
    /// Terminal: a solution was emitted.
    Finalized,
    /// Terminal: the run stopped without a finalized solution.
    Aborted,
}

impl LoopPhase {
    /// Check whether this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    /// The dispatcher phase driven from this state, if any.
    #[must_use]
    pub fn dispatch_phase(&self) -> Option<Phase> {
        match self {
            Self::Analyzing => Some(Phase::Analyze),
            Self::Hypothesizing => Some(Phase::Hypothesize),
            Self::Coding => Some(Phase::Code),
            Self::Validating => Some(Phase::Validate),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Analyzing => "analyzing",
            Self::Hypothesizing => "hypothesizing",
            Self::Coding => "coding",
            Self::Validating => "validating",
            Self::Auditing => "auditing",
            Self::Refining => "refining",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Finalized with all criteria met.
    Succeeded,
    /// Finalized with warnings after the budget (or progress) ran out.
    MaxIterationsReached,
    /// Stopped by cancellation, an unrecoverable fault, or an audit abort.
    Aborted,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::MaxIterationsReached => write!(f, "max_iterations_reached"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// The controller's final output.
///
/// Always includes the full iteration history, so a caller can inspect
/// exactly which iteration failed and why, even on abort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOutcome {
    /// The run this outcome belongs to.
    pub run_id: Uuid,
    /// How the run ended.
    pub status: OutcomeStatus,
    /// The emitted solution, when one was finalized.
    pub solution: Option<CodeArtifact>,
    /// The final iteration's merged validation report.
    pub evidence: Option<ValidationReport>,
    /// Accumulated failures carried forward as warnings (finalize-with-
    /// warnings only).
    pub warnings: Vec<Failure>,
    /// The complete audit trail.
    pub history: IterationHistory,
    /// Why the run ended.
    pub reason: String,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
}

impl FinalOutcome {
    /// Build a fully-succeeded outcome.
    #[must_use]
    pub fn succeeded(
        run_id: Uuid,
        solution: CodeArtifact,
        evidence: ValidationReport,
        history: IterationHistory,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            status: OutcomeStatus::Succeeded,
            solution: Some(solution),
            evidence: Some(evidence),
            warnings: Vec::new(),
            history,
            reason: reason.into(),
            finished_at: Utc::now(),
        }
    }

    /// Build a finalize-with-warnings outcome carrying the best candidate.
    #[must_use]
    pub fn finalized_with_warnings(
        run_id: Uuid,
        solution: CodeArtifact,
        evidence: ValidationReport,
        warnings: Vec<Failure>,
        history: IterationHistory,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            status: OutcomeStatus::MaxIterationsReached,
            solution: Some(solution),
            evidence: Some(evidence),
            warnings,
            history,
            reason: reason.into(),
            finished_at: Utc::now(),
        }
    }

    /// Build an aborted outcome with the partial history.
    #[must_use]
    pub fn aborted(run_id: Uuid, history: IterationHistory, reason: impl Into<String>) -> Self {
        Self {
            run_id,
            status: OutcomeStatus::Aborted,
            solution: None,
            evidence: None,
            warnings: Vec::new(),
            history,
            reason: reason.into(),
            finished_at: Utc::now(),
        }
    }

    /// Check whether a finalized solution was emitted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(LoopPhase::Finalized.is_terminal());
        assert!(LoopPhase::Aborted.is_terminal());
        assert!(!LoopPhase::Auditing.is_terminal());
    }

    #[test]
    fn test_dispatch_phase_mapping() {
        assert_eq!(LoopPhase::Analyzing.dispatch_phase(), Some(Phase::Analyze));
        assert_eq!(LoopPhase::Validating.dispatch_phase(), Some(Phase::Validate));
        assert_eq!(LoopPhase::Auditing.dispatch_phase(), None);
        assert_eq!(LoopPhase::Refining.dispatch_phase(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(LoopPhase::Hypothesizing.to_string(), "hypothesizing");
        assert_eq!(OutcomeStatus::MaxIterationsReached.to_string(), "max_iterations_reached");
    }

    #[test]
    fn test_aborted_outcome_has_no_solution() {
        let outcome = FinalOutcome::aborted(Uuid::new_v4(), IterationHistory::new(), "cancelled");
        assert!(!outcome.is_success());
        assert!(outcome.solution.is_none());
        assert!(outcome.history.is_empty());
    }
}
