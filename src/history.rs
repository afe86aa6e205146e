//! Append-only iteration history.
//!
//! The history is the audit trail of a run: one immutable record per
//! completed iteration, strictly ordered by iteration index with no gaps.
//! It is written exclusively by the loop controller after each AUDITING
//! state and is the sole persisted output of a run.

use crate::artifact::{AnalysisArtifact, CodeArtifact, HypothesisArtifact, ValidationReport};
use crate::audit::TerminationDecision;
use crate::error::{CrucibleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed iteration: all four artifacts plus the audit outcome.
///
/// Never modified after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration index, 1-based and monotonic.
    pub index: u32,
    /// The ANALYZE artifact in effect for this iteration.
    pub analysis: AnalysisArtifact,
    /// The HYPOTHESIZE artifact for this iteration.
    pub hypothesis: HypothesisArtifact,
    /// The CODE artifact for this iteration.
    pub code: CodeArtifact,
    /// The merged validation report for this iteration.
    pub report: ValidationReport,
    /// The composite audit score.
    pub overall: f64,
    /// The termination decision taken (exactly one per record).
    pub decision: TerminationDecision,
    /// When the record was committed.
    pub recorded_at: DateTime<Utc>,
}

impl IterationRecord {
    /// Create a record for a completed iteration.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u32,
        analysis: AnalysisArtifact,
        hypothesis: HypothesisArtifact,
        code: CodeArtifact,
        report: ValidationReport,
        overall: f64,
        decision: TerminationDecision,
    ) -> Self {
        Self {
            index,
            analysis,
            hypothesis,
            code,
            report,
            overall,
            decision,
            recorded_at: Utc::now(),
        }
    }
}

/// Ordered, append-only sequence of iteration records.
///
/// # Example
///
/// ```rust,ignore
/// use crucible::history::IterationHistory;
///
/// let mut history = IterationHistory::new();
/// history.append(record)?;
/// assert_eq!(history.len(), 1);
/// println!("{}", history.to_json()?);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationHistory {
    records: Vec<IterationRecord>,
}

impl IterationHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, enforcing the monotonic gap-free index invariant.
    ///
    /// # Errors
    ///
    /// Returns [`CrucibleError::History`] if the record's index is not
    /// exactly one past the last committed index.
    pub fn append(&mut self, record: IterationRecord) -> Result<()> {
        let expected = self.records.len() as u32 + 1;
        if record.index != expected {
            return Err(CrucibleError::history(format!(
                "expected iteration index {}, got {}",
                expected, record.index
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Number of committed iterations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any iteration has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The most recently committed record.
    #[must_use]
    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    /// The overall score of the most recent iteration.
    #[must_use]
    pub fn last_overall(&self) -> Option<f64> {
        self.records.last().map(|r| r.overall)
    }

    /// All committed records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    /// Iterate over committed records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &IterationRecord> {
        self.records.iter()
    }

    /// Export the full audit trail as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Decision, TerminationDecision};

    fn record(index: u32, overall: f64) -> IterationRecord {
        IterationRecord::new(
            index,
            AnalysisArtifact::default(),
            HypothesisArtifact::default(),
            CodeArtifact::default(),
            ValidationReport::default(),
            overall,
            TerminationDecision::simple(Decision::Refine, overall, "below threshold"),
        )
    }

    #[test]
    fn test_append_monotonic() {
        let mut history = IterationHistory::new();
        assert!(history.append(record(1, 0.5)).is_ok());
        assert!(history.append(record(2, 0.6)).is_ok());
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().index, 2);
    }

    #[test]
    fn test_append_rejects_gap() {
        let mut history = IterationHistory::new();
        history.append(record(1, 0.5)).unwrap();
        let err = history.append(record(3, 0.6)).unwrap_err();
        assert!(err.to_string().contains("expected iteration index 2"));
    }

    #[test]
    fn test_append_rejects_duplicate() {
        let mut history = IterationHistory::new();
        history.append(record(1, 0.5)).unwrap();
        assert!(history.append(record(1, 0.6)).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_append_rejects_zero_index() {
        let mut history = IterationHistory::new();
        assert!(history.append(record(0, 0.5)).is_err());
    }

    #[test]
    fn test_last_overall() {
        let mut history = IterationHistory::new();
        assert!(history.last_overall().is_none());
        history.append(record(1, 0.42)).unwrap();
        assert!((history.last_overall().unwrap() - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_to_json_contains_indices() {
        let mut history = IterationHistory::new();
        history.append(record(1, 0.5)).unwrap();
        let json = history.to_json().unwrap();
        assert!(json.contains("\"index\": 1"));
    }
}
