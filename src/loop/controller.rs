//! The loop controller: phase sequencing, budgets, and termination.
//!
//! The controller owns the run: it drives phases in order by invoking the
//! agent dispatcher (plus the validation runner during VALIDATE), feeds
//! the merged report to the self-audit scorer, appends exactly one
//! iteration record per pass through AUDITING, and applies the resulting
//! termination decision.
//!
//! # Dependency Injection
//!
//! Both collaborators are injected as trait objects, so the controller
//! never depends on a concrete model or sandbox implementation and can be
//! exercised end to end with deterministic mocks.
//!
//! # Example
//!
//! ```rust,ignore
//! use crucible::{LoopController, LoopConfig, Request};
//!
//! let controller = LoopController::new(completion, executor);
//! let outcome = controller
//!     .run(Request::new("reverse a string"), LoopConfig::default())
//!     .await?;
//! println!("{}: {}", outcome.status, outcome.reason);
//! ```

use super::state::{FinalOutcome, LoopPhase};
use crate::artifact::{
    AnalysisArtifact, CodeArtifact, Failure, FailureCategory, FailureSeverity, HypothesisArtifact,
    Phase, PhaseArtifact, Request, ValidationReport,
};
use crate::audit::{self, AuditContext, Decision};
use crate::collaborator::{CodeExecutor, TextCompletion};
use crate::config::LoopConfig;
use crate::dispatch::{AgentDispatcher, ContextPackage};
use crate::error::{CrucibleError, Result};
use crate::history::{IterationHistory, IterationRecord};
use crate::validation::{ComplianceRule, ValidationRunner};
use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drives one request through the iterative loop.
///
/// Strictly sequential per request: each phase awaits its predecessor's
/// committed artifact. Distinct requests use distinct controller
/// instances and share no mutable state.
pub struct LoopController {
    completion: Arc<dyn TextCompletion>,
    executor: Arc<dyn CodeExecutor>,
    rules: Vec<Box<dyn ComplianceRule>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl LoopController {
    /// Create a controller over the two injected collaborators.
    #[must_use]
    pub fn new(completion: Arc<dyn TextCompletion>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            completion,
            executor,
            rules: Vec::new(),
            cancel: None,
        }
    }

    /// Add a compliance rule evaluated during every VALIDATE phase.
    #[must_use]
    pub fn with_rule(mut self, rule: Box<dyn ComplianceRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Attach a cancellation signal, observed at every await point.
    ///
    /// Send `true` on the paired `watch::Sender` to cancel; the run
    /// finalizes as aborted and returns the history accumulated so far.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the loop to completion.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid configuration or an internal
    /// invariant violation. Collaborator faults, cancellation, and audit
    /// aborts all produce an `Ok` outcome with status `Aborted` so the
    /// partial history is never discarded silently.
    pub async fn run(&self, request: Request, config: LoopConfig) -> Result<FinalOutcome> {
        config.validate()?;

        let dispatcher = AgentDispatcher::new(self.completion.clone());
        let runner = ValidationRunner::new(self.executor.clone())
            .with_timeout(config.example_timeout)
            .with_workers(config.validation_workers);

        let mut history = IterationHistory::new();
        let mut state = LoopPhase::Analyzing;
        let mut iteration: u32 = 1;
        let mut analysis: Option<AnalysisArtifact> = None;
        let mut hypothesis: Option<HypothesisArtifact> = None;
        let mut code: Option<CodeArtifact> = None;
        let mut report: Option<ValidationReport> = None;
        let mut focus: Option<String> = None;
        let mut restart_analysis = false;
        // Dispatch faults recovered via retry, folded into the
        // iteration's report at audit time.
        let mut absorbed: Vec<Failure> = Vec::new();

        info!(run_id = %request.id, max_iterations = config.max_iterations, "loop started");

        loop {
            debug!(%state, iteration, "entering state");
            match state {
                LoopPhase::Analyzing => {
                    let invoked = {
                        let ctx = ContextPackage {
                            request: &request,
                            analysis: None,
                            history: &history,
                            specific_focus: focus.as_deref(),
                            code: None,
                        };
                        self.guarded(
                            iteration,
                            self.dispatch_once(
                                &dispatcher,
                                Phase::Analyze,
                                &ctx,
                                iteration,
                                &config,
                                &mut absorbed,
                            ),
                        )
                        .await
                    };
                    match invoked {
                        Ok(artifact) => {
                            analysis = Some(expect_artifact(
                                artifact.into_analysis(),
                                Phase::Analyze,
                                iteration,
                            )?);
                            state = LoopPhase::Hypothesizing;
                        }
                        Err(err) => return Ok(fault_outcome(&request, history, &err)),
                    }
                }

                LoopPhase::Hypothesizing => {
                    let invoked = {
                        let ctx = ContextPackage {
                            request: &request,
                            analysis: analysis.as_ref(),
                            history: &history,
                            specific_focus: focus.as_deref(),
                            code: None,
                        };
                        self.guarded(
                            iteration,
                            self.dispatch_once(
                                &dispatcher,
                                Phase::Hypothesize,
                                &ctx,
                                iteration,
                                &config,
                                &mut absorbed,
                            ),
                        )
                        .await
                    };
                    match invoked {
                        Ok(artifact) => {
                            hypothesis = Some(expect_artifact(
                                artifact.into_hypothesis(),
                                Phase::Hypothesize,
                                iteration,
                            )?);
                            state = LoopPhase::Coding;
                        }
                        Err(err) => return Ok(fault_outcome(&request, history, &err)),
                    }
                }

                LoopPhase::Coding => {
                    let invoked = {
                        let ctx = ContextPackage {
                            request: &request,
                            analysis: analysis.as_ref(),
                            history: &history,
                            specific_focus: focus.as_deref(),
                            code: None,
                        };
                        self.guarded(
                            iteration,
                            self.dispatch_once(
                                &dispatcher,
                                Phase::Code,
                                &ctx,
                                iteration,
                                &config,
                                &mut absorbed,
                            ),
                        )
                        .await
                    };
                    match invoked {
                        Ok(artifact) => {
                            code = Some(expect_artifact(
                                artifact.into_code(),
                                Phase::Code,
                                iteration,
                            )?);
                            state = LoopPhase::Validating;
                        }
                        Err(err) => return Ok(fault_outcome(&request, history, &err)),
                    }
                }

                LoopPhase::Validating => {
                    let current_analysis = analysis
                        .as_ref()
                        .ok_or_else(|| anyhow!("validating without an analysis"))?;
                    let current_code = code
                        .as_ref()
                        .ok_or_else(|| anyhow!("validating without a code artifact"))?;

                    let examples = current_analysis.examples.clone();
                    let validated = self
                        .guarded(iteration, async {
                            Ok(runner.validate(current_code, &examples, &self.rules).await)
                        })
                        .await;
                    let mut merged = match validated {
                        Ok(rep) => rep,
                        Err(err) => return Ok(fault_outcome(&request, history, &err)),
                    };

                    // Review dispatch: the text collaborator audits the
                    // candidate for architecture and security findings.
                    let reviewed = {
                        let ctx = ContextPackage {
                            request: &request,
                            analysis: analysis.as_ref(),
                            history: &history,
                            specific_focus: focus.as_deref(),
                            code: code.as_ref(),
                        };
                        self.guarded(
                            iteration,
                            self.dispatch_once(
                                &dispatcher,
                                Phase::Validate,
                                &ctx,
                                iteration,
                                &config,
                                &mut absorbed,
                            ),
                        )
                        .await
                    };
                    match reviewed {
                        Ok(artifact) => {
                            let review = expect_artifact(
                                artifact.into_review(),
                                Phase::Validate,
                                iteration,
                            )?;
                            merged.merge_review(review);
                        }
                        Err(err) => return Ok(fault_outcome(&request, history, &err)),
                    }

                    report = Some(merged);
                    state = LoopPhase::Auditing;
                }

                LoopPhase::Auditing => {
                    let current_analysis = analysis
                        .as_ref()
                        .ok_or_else(|| anyhow!("auditing without an analysis"))?;
                    let mut current_report = report
                        .take()
                        .ok_or_else(|| anyhow!("auditing without a report"))?;
                    current_report.failures.append(&mut absorbed);

                    let breakdown =
                        audit::score(&current_report, current_analysis, &config.weights);
                    let ctx = AuditContext {
                        iteration_index: iteration,
                        max_iterations: config.max_iterations,
                        previous_overall: history.last_overall(),
                    };
                    let mut decision = audit::decide(&breakdown, &current_report, &ctx, &config);

                    if decision.decision == Decision::Refine
                        && decision.stuck
                        && config.finalize_on_stuck
                    {
                        warn!(iteration, "no score progress, escalating to finalize with warnings");
                        decision.decision = Decision::FinalizeWithWarnings;
                        decision.reason =
                            format!("{} (stuck: score not improving)", decision.reason);
                    }

                    info!(
                        iteration,
                        overall = breakdown.overall,
                        decision = %decision.decision,
                        stuck = decision.stuck,
                        "iteration audited"
                    );

                    let record = IterationRecord::new(
                        iteration,
                        current_analysis.clone(),
                        hypothesis.clone().unwrap_or_default(),
                        code.clone().unwrap_or_default(),
                        current_report.clone(),
                        breakdown.overall,
                        decision.clone(),
                    );
                    history.append(record)?;

                    match decision.decision {
                        Decision::Finalize => {
                            let solution = code
                                .take()
                                .ok_or_else(|| anyhow!("finalizing without a code artifact"))?;
                            return Ok(FinalOutcome::succeeded(
                                request.id,
                                solution,
                                current_report,
                                history,
                                decision.reason,
                            ));
                        }
                        Decision::FinalizeWithWarnings => {
                            let solution = code
                                .take()
                                .ok_or_else(|| anyhow!("finalizing without a code artifact"))?;
                            let warnings: Vec<Failure> = history
                                .iter()
                                .flat_map(|r| r.report.failures.iter().cloned())
                                .collect();
                            return Ok(FinalOutcome::finalized_with_warnings(
                                request.id,
                                solution,
                                current_report,
                                warnings,
                                history,
                                decision.reason,
                            ));
                        }
                        Decision::Abort => {
                            return Ok(FinalOutcome::aborted(
                                request.id,
                                history,
                                decision.reason,
                            ));
                        }
                        Decision::Refine => {
                            focus = decision
                                .guidance
                                .as_ref()
                                .map(|g| g.focus_areas.join("; "));
                            restart_analysis = config
                                .refine_restarts_analysis
                                .unwrap_or(decision.targets_analysis);
                            state = LoopPhase::Refining;
                        }
                    }
                }

                LoopPhase::Refining => {
                    iteration += 1;
                    hypothesis = None;
                    code = None;
                    report = None;
                    if restart_analysis {
                        debug!(iteration, "refinement targets the analysis");
                        analysis = None;
                        state = LoopPhase::Analyzing;
                    } else {
                        state = LoopPhase::Hypothesizing;
                    }
                }

                LoopPhase::Finalized | LoopPhase::Aborted => {
                    return Err(anyhow!("terminal state {state} re-entered").into());
                }
            }
        }
    }

    /// Invoke the dispatcher, allowing exactly one retry after a backoff.
    ///
    /// A fault recovered by the retry is recorded in `faults` so the
    /// iteration's report carries it; a second consecutive failure for
    /// the same phase in the same iteration is an unrecoverable external
    /// fault.
    async fn dispatch_once(
        &self,
        dispatcher: &AgentDispatcher,
        phase: Phase,
        ctx: &ContextPackage<'_>,
        iteration: u32,
        config: &LoopConfig,
        faults: &mut Vec<Failure>,
    ) -> Result<PhaseArtifact> {
        match dispatcher.invoke(phase, ctx).await {
            Ok(artifact) => Ok(artifact),
            Err(first) => {
                warn!(%phase, iteration, error = %first, "dispatch failed, retrying once");
                tokio::time::sleep(config.retry_backoff).await;
                let artifact = dispatcher.invoke(phase, ctx).await.map_err(|second| {
                    CrucibleError::unrecoverable(phase, iteration, second.to_string())
                })?;
                faults.push(
                    Failure::new(
                        FailureCategory::Dispatch,
                        FailureSeverity::Minor,
                        format!("dispatch retried after fault: {first}"),
                    )
                    .with_location(phase.to_string()),
                );
                Ok(artifact)
            }
        }
    }

    /// Race a phase future against the cancellation signal.
    async fn guarded<T, F>(&self, iteration: u32, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(rx) = &self.cancel else {
            return fut.await;
        };
        let mut rx = rx.clone();
        if *rx.borrow() {
            return Err(CrucibleError::Cancelled { iteration });
        }
        tokio::select! {
            res = fut => res,
            () = wait_for_cancel(&mut rx) => Err(CrucibleError::Cancelled { iteration }),
        }
    }
}

/// Resolve when the watch channel signals cancellation. Never resolves if
/// the sender is dropped without cancelling.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

/// Unwrap a phase artifact variant, surfacing a schema/phase mismatch as
/// an unrecoverable fault.
fn expect_artifact<T>(artifact: Option<T>, phase: Phase, iteration: u32) -> Result<T> {
    artifact.ok_or_else(|| {
        CrucibleError::unrecoverable(phase, iteration, "dispatcher returned wrong artifact kind")
    })
}

/// Outcome for faults that exit the loop outside the audit path.
fn fault_outcome(request: &Request, history: IterationHistory, err: &CrucibleError) -> FinalOutcome {
    warn!(run_id = %request.id, error = %err, "run aborted outside audit path");
    FinalOutcome::aborted(request.id, history, err.to_string())
}
