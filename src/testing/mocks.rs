//! Mock collaborators with scripted behavior.

use crate::artifact::CodeArtifact;
use crate::collaborator::{
    CodeExecutor, CompletionError, ExecError, ExecutionOutput, TextCompletion,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A text collaborator that replays a queue of scripted replies.
///
/// Failures are consumed before replies: `with_failures(n)` makes the
/// next `n` calls return [`CompletionError::Unavailable`], after which
/// the queued replies are popped in order. Every prompt received is
/// recorded for assertion.
#[derive(Debug, Default)]
pub struct MockTextCompletion {
    responses: Mutex<VecDeque<String>>,
    failures: AtomicU32,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockTextCompletion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply; replies are consumed in FIFO order.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(response.into());
        self
    }

    /// Fail the next `n` calls with an unavailable error.
    #[must_use]
    pub fn with_failures(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Handle to the prompts received so far.
    #[must_use]
    pub fn recorded_prompts(&self) -> Arc<Mutex<Vec<String>>> {
        self.prompts.clone()
    }
}

#[async_trait]
impl TextCompletion for MockTextCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CompletionError::Unavailable(
                "scripted outage".to_string(),
            ));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CompletionError::Unavailable("no scripted reply left".to_string()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// A code executor that maps inputs to scripted stdout.
///
/// `with_output` registers a sticky reply: it is returned every time the
/// input is run. `with_output_sequence` registers replies popped in
/// order, with the final one sticking for subsequent runs.
#[derive(Debug, Default)]
pub struct MockCodeExecutor {
    outputs: Mutex<HashMap<String, VecDeque<String>>>,
    delays: HashMap<String, Duration>,
    exec_failures: HashMap<String, String>,
    build_failure: Option<String>,
    exit_status: i32,
}

impl MockCodeExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script stdout for an input, reused on every run of that input.
    #[must_use]
    pub fn with_output(self, input: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .entry(input.into())
            .or_default()
            .push_back(stdout.into());
        self
    }

    /// Script a sequence of stdouts for an input; the last entry repeats.
    #[must_use]
    pub fn with_output_sequence(self, input: impl Into<String>, outputs: Vec<String>) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .entry(input.into())
            .or_default()
            .extend(outputs);
        self
    }

    /// Fail every run with a build error.
    #[must_use]
    pub fn with_build_failure(mut self, detail: impl Into<String>) -> Self {
        self.build_failure = Some(detail.into());
        self
    }

    /// Sleep before answering a specific input.
    #[must_use]
    pub fn with_delay_for(mut self, input: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(input.into(), delay);
        self
    }

    /// Report this exit status for every run.
    #[must_use]
    pub fn with_exit_status(mut self, status: i32) -> Self {
        self.exit_status = status;
        self
    }

    /// Fail runs of a specific input with a runtime error.
    #[must_use]
    pub fn with_execution_failure(mut self, input: impl Into<String>, detail: impl Into<String>) -> Self {
        self.exec_failures.insert(input.into(), detail.into());
        self
    }
}

#[async_trait]
impl CodeExecutor for MockCodeExecutor {
    async fn run(&self, _code: &CodeArtifact, input: &str) -> Result<ExecutionOutput, ExecError> {
        if let Some(delay) = self.delays.get(input) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(detail) = &self.build_failure {
            return Err(ExecError::Build {
                detail: detail.clone(),
            });
        }
        if let Some(detail) = self.exec_failures.get(input) {
            return Err(ExecError::Execution {
                detail: detail.clone(),
            });
        }
        let mut outputs = self.outputs.lock().unwrap();
        let queue = outputs.get_mut(input).ok_or_else(|| ExecError::Execution {
            detail: format!("no scripted output for input {input:?}"),
        })?;
        let stdout = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(ExecutionOutput {
            stdout,
            exit_status: self.exit_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_failures_then_replies() {
        let mock = MockTextCompletion::new()
            .with_response("ok")
            .with_failures(1);
        assert!(mock.complete("p1").await.is_err());
        assert_eq!(mock.complete("p2").await.unwrap(), "ok");
        assert_eq!(mock.recorded_prompts().lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_executor_sticky_and_sequenced_outputs() {
        let mock = MockCodeExecutor::new()
            .with_output("a", "1")
            .with_output_sequence("b", vec!["x".into(), "y".into()]);
        let code = CodeArtifact::default();
        assert_eq!(mock.run(&code, "a").await.unwrap().stdout, "1");
        assert_eq!(mock.run(&code, "a").await.unwrap().stdout, "1");
        assert_eq!(mock.run(&code, "b").await.unwrap().stdout, "x");
        assert_eq!(mock.run(&code, "b").await.unwrap().stdout, "y");
        assert_eq!(mock.run(&code, "b").await.unwrap().stdout, "y");
        assert!(mock.run(&code, "missing").await.is_err());
    }
}
