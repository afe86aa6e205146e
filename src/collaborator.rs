//! Capability contracts for external collaborators.
//!
//! The loop never implements a language model or a build sandbox; both are
//! injected as narrow trait objects so the controller can be exercised
//! with deterministic stubs in tests.
//!
//! # Object Safety
//!
//! Both traits are object-safe and `Send + Sync`, supporting dynamic
//! dispatch via `Arc<dyn TextCompletion>` / `Arc<dyn CodeExecutor>` for
//! runtime collaborator selection without generic type parameters.

use crate::artifact::CodeArtifact;
use async_trait::async_trait;
use thiserror::Error;

/// Error from the text-generation collaborator.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// The collaborator could not be reached or refused the request.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// The text-generation collaborator consumed by the agent dispatcher.
///
/// Implementations are stochastic; determinism is neither guaranteed nor
/// required. Correctness authority lies with the self-audit scorer, never
/// with this collaborator.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Complete a prompt and return the raw response text.
    ///
    /// The response is expected to contain a JSON payload matching the
    /// artifact schema named in the prompt; schema enforcement happens in
    /// the dispatcher, not here.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Unavailable`] when the collaborator
    /// cannot be reached.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Human-readable identifier of the backing model.
    fn model_name(&self) -> &str;
}

/// Output of one candidate-solution execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Process exit status (0 = success).
    pub exit_status: i32,
}

impl ExecutionOutput {
    /// Create a successful output.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_status: 0,
        }
    }
}

/// Error from the build/execute collaborator.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The candidate did not build. Never retried automatically: a build
    /// failure is a code defect requiring refinement, not a transient
    /// fault.
    #[error("build failed: {detail}")]
    Build { detail: String },

    /// The candidate built but execution itself faulted (crash, sandbox
    /// error) before producing output.
    #[error("execution failed: {detail}")]
    Execution { detail: String },
}

/// The build/execute collaborator consumed by the validation runner.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Build (if needed) and run the candidate against one input.
    ///
    /// Timeouts are enforced by the caller, not the implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Build`] when the candidate does not compile,
    /// [`ExecError::Execution`] when the run itself faults.
    async fn run(&self, code: &CodeArtifact, input: &str) -> Result<ExecutionOutput, ExecError>;
}
