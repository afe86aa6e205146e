//! Custom error types for the crucible control loop.
//!
//! This module provides the structured error taxonomy used throughout the
//! crate, including the dispatch-level errors that the loop controller
//! retries and the unrecoverable faults that abort a run.

use crate::artifact::Phase;
use thiserror::Error;

/// Error produced by the agent dispatcher when invoking the
/// text-generation collaborator.
///
/// Both kinds are retryable by the loop controller exactly once per phase
/// per iteration; a second consecutive failure for the same phase becomes
/// [`CrucibleError::Unrecoverable`].
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The collaborator replied, but the reply did not decode into the
    /// artifact schema expected for the phase.
    #[error("malformed {phase} response: {detail}")]
    MalformedResponse { phase: Phase, detail: String },

    /// The collaborator could not be reached at all.
    #[error("text collaborator unavailable during {phase}: {detail}")]
    CollaboratorUnavailable { phase: Phase, detail: String },
}

impl DispatchError {
    /// The phase during which the dispatch failed.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::MalformedResponse { phase, .. }
            | Self::CollaboratorUnavailable { phase, .. } => *phase,
        }
    }
}

/// Main error type for crucible operations.
#[derive(Error, Debug)]
pub enum CrucibleError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Loop Execution Errors
    // =========================================================================
    /// A collaborator invocation failed; recovered via retry where allowed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A collaborator invocation errored twice consecutively for the same
    /// phase in the same iteration. Signals an external fault, not a
    /// quality problem; the controller transitions directly to ABORTED.
    #[error("unrecoverable collaborator fault in {phase} (iteration {iteration}): {detail}")]
    Unrecoverable {
        phase: Phase,
        iteration: u32,
        detail: String,
    },

    /// The run was cancelled by the host
    #[error("run cancelled during iteration {iteration}")]
    Cancelled { iteration: u32 },

    /// Iteration history invariant violated (gap or duplicate index)
    #[error("iteration history violation: {message}")]
    History { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrucibleError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create an invalid-configuration error.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unrecoverable collaborator-fault error.
    pub fn unrecoverable(phase: Phase, iteration: u32, detail: impl Into<String>) -> Self {
        Self::Unrecoverable {
            phase,
            iteration,
            detail: detail.into(),
        }
    }

    /// Create a history-invariant error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is retryable at the phase level.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }

    /// Check if this error is fatal to the whole run.
    ///
    /// Only unrecoverable collaborator faults and explicit cancellation
    /// exit the loop outside the normal audit decision path.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. } | Self::Cancelled { .. })
    }
}

/// Type alias for crucible results.
pub type Result<T> = std::result::Result<T, CrucibleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::MalformedResponse {
            phase: Phase::Analyze,
            detail: "missing field `requirements`".into(),
        };
        assert!(err.to_string().contains("analyze"));
        assert!(err.to_string().contains("requirements"));
        assert_eq!(err.phase(), Phase::Analyze);
    }

    #[test]
    fn test_unrecoverable_display() {
        let err = CrucibleError::unrecoverable(Phase::Code, 3, "connection refused");
        assert!(err.to_string().contains("iteration 3"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_is_retryable() {
        let dispatch: CrucibleError = DispatchError::CollaboratorUnavailable {
            phase: Phase::Hypothesize,
            detail: "timeout".into(),
        }
        .into();
        assert!(dispatch.is_retryable());
        assert!(!CrucibleError::unrecoverable(Phase::Code, 1, "x").is_retryable());
    }

    #[test]
    fn test_is_fatal() {
        assert!(CrucibleError::unrecoverable(Phase::Analyze, 1, "down").is_fatal());
        assert!(CrucibleError::Cancelled { iteration: 2 }.is_fatal());
        assert!(!CrucibleError::invalid_config("max_iterations", "zero").is_fatal());
    }

    #[test]
    fn test_invalid_config() {
        let err = CrucibleError::invalid_config("confidence_threshold", "must be in (0, 1]");
        assert!(err.to_string().contains("confidence_threshold"));
    }
}
