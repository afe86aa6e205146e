//! Crucible - Deterministic Iterative Refinement Loop
//!
//! A control loop that drives a text collaborator and a code executor
//! through repeated analyze / hypothesize / code / validate passes until
//! a self-audit decides the candidate solution is good enough, the
//! iteration budget runs out, or the run must stop.
//!
//! ```text
//!   ANALYZE ──► HYPOTHESIZE ──► CODE ──► VALIDATE ──► AUDIT
//!      ▲              ▲                                 │
//!      │              │            REFINE              │
//!      └──────────────┴─────────────◄───────────────────┤
//!                                                       │
//!                    FINALIZE / FINALIZE_WITH_WARNINGS / ABORT
//! ```
//!
//! # Architecture
//!
//! - [`artifact`] - Phase artifacts: requests, analyses, hypotheses, code, reports
//! - [`audit`] - Pure scoring and the ordered termination-decision guards
//! - [`collaborator`] - The injected `TextCompletion` and `CodeExecutor` traits
//! - [`config`] - Loop configuration and score weights
//! - [`dispatch`] - Prompt assembly and strict decoding of collaborator replies
//! - [`error`] - Error types and fault classification
//! - [`history`] - The append-only per-run iteration history
//! - [`validation`] - Concurrent example execution and compliance rules
//! - [`testing`] - Mock collaborators and scripted-reply fixtures
//!
//! The controller itself lives in [`r#loop`]. Determinism is the design
//! center: given the same collaborator replies and executor outputs, a
//! run produces the same phase sequence, the same scores, and the same
//! outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crucible::{LoopConfig, LoopController, Request};
//!
//! let controller = LoopController::new(completion, executor);
//! let outcome = controller
//!     .run(Request::new("sort integers from stdin"), LoopConfig::default())
//!     .await?;
//!
//! if let Some(solution) = outcome.solution {
//!     for file in solution.files {
//!         println!("{}", file.path);
//!     }
//! }
//! ```

pub mod artifact;
pub mod audit;
pub mod collaborator;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod r#loop;
pub mod testing;
pub mod validation;

// Re-export commonly used types
pub use error::{CrucibleError, DispatchError, Result};

// Re-export artifact types
pub use artifact::{
    AnalysisArtifact, CodeArtifact, Failure, FailureCategory, FailureSeverity, HypothesisArtifact,
    IoExample, Phase, PhaseArtifact, Request, Requirement, ReviewArtifact, SourceFile,
    TaskAssignment, TestResult, ValidationReport,
};

// Re-export the audit surface
pub use audit::{
    decide, score, AuditContext, Decision, RefinementGuidance, ScoreBreakdown,
    TerminationDecision,
};

// Re-export configuration
pub use config::{LoopConfig, ScoreWeights};

// Re-export collaborator seams
pub use collaborator::{
    CodeExecutor, CompletionError, ExecError, ExecutionOutput, TextCompletion,
};

// Re-export the loop surface
pub use r#loop::{FinalOutcome, LoopController, LoopPhase, OutcomeStatus};

// Re-export history and validation types
pub use history::{IterationHistory, IterationRecord};
pub use validation::{ComplianceRule, DependencyAllowlistRule, OutputMatcher, ValidationRunner};

// Re-export dispatch types
pub use dispatch::{AgentDispatcher, ContextPackage};
