//! Plan orchestration: sequencing, budgets, cancellation and checkpoints.

use std::time::Duration;

use jiff::Timestamp;
use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, ProgressEvent};
use super::step::{probe_snapshot, StepExecutor};
use crate::{
    criteria,
    error::{BudgetScope, Result, RunbookError},
    models::{
        CommandOutcome, PendingCheckpoint, Plan, PlanExecutionResult, PlanStatus,
        StepExecutionResult, StepStatus,
    },
    transport::{CommandExecutor, FilesystemProbe, LocalFilesystem},
};

/// Operator decision on a suspended checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Approved,
    Rejected,
}

/// Builder for creating [`PlanRunner`] instances.
pub struct RunnerBuilder<E, P> {
    executor: E,
    probe: P,
    events: Option<UnboundedSender<ProgressEvent>>,
    cancel: Option<CancellationToken>,
}

impl<E: CommandExecutor> RunnerBuilder<E, LocalFilesystem> {
    /// Starts a builder probing the local filesystem.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            probe: LocalFilesystem,
            events: None,
            cancel: None,
        }
    }
}

impl<E: CommandExecutor, P: FilesystemProbe> RunnerBuilder<E, P> {
    /// Replaces the filesystem probe used by file and directory criteria.
    pub fn with_probe<Q: FilesystemProbe>(self, probe: Q) -> RunnerBuilder<E, Q> {
        RunnerBuilder {
            executor: self.executor,
            probe,
            events: self.events,
            cancel: self.cancel,
        }
    }

    /// Sends [`ProgressEvent`]s to `sender` while running.
    pub fn with_events(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Uses an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> PlanRunner<E, P> {
        PlanRunner {
            executor: self.executor,
            probe: self.probe,
            events: EventSink::new(self.events),
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
        }
    }
}

/// Runs plans step by step against one command executor.
///
/// A runner holds no per-run state, so one instance can run several plans
/// one after another. Cancellation is sticky: once the token is cancelled,
/// every later run stops before its first step.
pub struct PlanRunner<E, P = LocalFilesystem> {
    executor: E,
    probe: P,
    events: EventSink,
    cancel: CancellationToken,
}

impl<E: CommandExecutor> PlanRunner<E, LocalFilesystem> {
    pub fn builder(executor: E) -> RunnerBuilder<E, LocalFilesystem> {
        RunnerBuilder::new(executor)
    }
}

impl<E: CommandExecutor, P: FilesystemProbe> PlanRunner<E, P> {
    /// A handle that cancels this runner's runs when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every step of `plan` in order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the plan does not validate. Step
    /// failures, budget violations and cancellation are reported through the
    /// returned result.
    pub async fn run(&self, plan: &Plan) -> Result<PlanExecutionResult> {
        plan.validate()?;

        let mut result = PlanExecutionResult::new(&plan.id, &plan.title);
        result.status = PlanStatus::Executing;
        info!(
            "Starting plan '{}' with {} steps",
            plan.title,
            plan.steps.len()
        );
        self.events.emit(ProgressEvent::PlanStarted {
            plan_id: plan.id.clone(),
            title: plan.title.clone(),
            total_steps: plan.steps.len(),
        });

        Ok(self.drive(plan, result, 0).await)
    }

    /// Continues a run suspended on a checkpoint.
    ///
    /// An approved checkpoint marks its step successful and runs the next
    /// step. A rejected one fails the step and the plan.
    ///
    /// # Errors
    ///
    /// Returns an input error when `suspended` is not awaiting confirmation
    /// or does not belong to `plan`.
    pub async fn resume(
        &self,
        plan: &Plan,
        mut suspended: PlanExecutionResult,
        confirmation: Confirmation,
    ) -> Result<PlanExecutionResult> {
        if suspended.status != PlanStatus::AwaitingConfirmation {
            return Err(RunbookError::invalid_input("status").with_reason(format!(
                "run is {}, not awaiting confirmation",
                suspended.status.as_str()
            )));
        }
        if suspended.plan_id != plan.id {
            return Err(RunbookError::invalid_input("plan_id").with_reason(format!(
                "run belongs to plan '{}', not '{}'",
                suspended.plan_id, plan.id
            )));
        }
        let checkpoint = suspended.pending_checkpoint.take().ok_or_else(|| {
            RunbookError::invalid_input("pending_checkpoint").with_reason("no checkpoint recorded")
        })?;
        plan.validate()?;

        let step_result = suspended
            .step_results
            .get_mut(checkpoint.step_index)
            .filter(|r| r.step_id == checkpoint.step_id)
            .ok_or_else(|| {
                RunbookError::invalid_input("pending_checkpoint").with_reason(format!(
                    "no result for step '{}' at position {}",
                    checkpoint.step_id, checkpoint.step_index
                ))
            })?;

        match confirmation {
            Confirmation::Approved => {
                info!("Checkpoint at step '{}' approved", checkpoint.step_id);
                step_result.status = StepStatus::Success;
                suspended.status = PlanStatus::Executing;
                Ok(self.drive(plan, suspended, checkpoint.step_index + 1).await)
            }
            Confirmation::Rejected => {
                warn!("Checkpoint at step '{}' rejected", checkpoint.step_id);
                step_result.status = StepStatus::Failed;
                step_result.error = Some("checkpoint rejected".to_string());
                let message = format!("Checkpoint at step '{}' was rejected", checkpoint.step_id);
                Ok(self
                    .conclude(plan, suspended, PlanStatus::Failed, message, None)
                    .await)
            }
        }
    }

    async fn drive(
        &self,
        plan: &Plan,
        mut result: PlanExecutionResult,
        start: usize,
    ) -> PlanExecutionResult {
        let budget = plan.max_total_time();

        for (index, step) in plan.steps.iter().enumerate().skip(start) {
            if self.cancel.is_cancelled() {
                let message = format!("Execution cancelled before step '{}'", step.id);
                return self
                    .conclude(plan, result, PlanStatus::Cancelled, message, None)
                    .await;
            }
            if Duration::from_millis(result.total_duration_ms()) >= budget {
                return self.over_budget(plan, result, &step.id).await;
            }

            self.events.emit(ProgressEvent::StepStarted {
                index,
                step_id: step.id.clone(),
                title: step.title.clone(),
                command: step.command.clone(),
            });

            let retries_left = plan.max_retries.saturating_sub(result.retries_used);
            let executor =
                StepExecutor::new(&self.executor, &self.probe, &self.events, &self.cancel);
            let report = match executor.execute(plan, step, retries_left).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Step '{}' aborted: {e}", step.id);
                    let mut aborted = StepExecutionResult::pending(
                        &step.id,
                        &step.command,
                        step.recovery.auto_recovery,
                    );
                    aborted.status = StepStatus::Failed;
                    aborted.error = Some(e.to_string());
                    result.step_results.push(aborted);
                    let message = format!("Step '{}' failed: {e}", step.id);
                    return self
                        .conclude(plan, result, PlanStatus::Failed, message, Some(e.to_string()))
                        .await;
                }
            };

            result.retries_used += report.retries_used;
            let status = report.result.status;
            let step_error = report.result.error.clone();
            result.step_results.push(report.result);

            if report.cancelled {
                let message = format!("Execution cancelled during step '{}'", step.id);
                return self
                    .conclude(plan, result, PlanStatus::Cancelled, message, None)
                    .await;
            }

            if status == StepStatus::Failed {
                let message = match &step_error {
                    Some(error) => format!("Step '{}' failed: {error}", step.id),
                    None => format!("Step '{}' failed", step.id),
                };
                return self
                    .conclude(plan, result, PlanStatus::Failed, message, step_error)
                    .await;
            }

            if Duration::from_millis(result.total_duration_ms()) > budget {
                let error = plan_budget_error(plan);
                if status == StepStatus::AwaitingConfirmation {
                    if let Some(last) = result.step_results.last_mut() {
                        last.status = StepStatus::Failed;
                        last.error = Some(error.to_string());
                    }
                }
                return match plan.steps.get(index + 1) {
                    Some(next) => self.over_budget(plan, result, &next.id).await,
                    None => {
                        warn!("{error}");
                        let message = format!("Plan finished past its time budget: {error}");
                        self.conclude(
                            plan,
                            result,
                            PlanStatus::Failed,
                            message,
                            Some(error.to_string()),
                        )
                        .await
                    }
                };
            }

            if status == StepStatus::AwaitingConfirmation {
                let instructions = step
                    .checkpoint
                    .as_ref()
                    .map(|c| c.instructions.clone())
                    .unwrap_or_default();
                return self.suspend(result, index, step.id.clone(), instructions);
            }
        }

        self.complete(plan, result).await
    }

    /// Concludes a run whose steps all succeeded. Global criteria decide
    /// between Completed and Failed.
    async fn complete(&self, plan: &Plan, mut result: PlanExecutionResult) -> PlanExecutionResult {
        match self.evaluate_globals(plan, &mut result).await {
            Ok(None) => {
                let message = format!("All {} steps completed successfully", plan.steps.len());
                self.stamp(plan, result, PlanStatus::Completed, message, None)
            }
            Ok(Some(failure)) => {
                let message = format!("Global criteria failed: {failure}");
                self.stamp(plan, result, PlanStatus::Failed, message, Some(failure))
            }
            Err(e) => {
                let message = format!("Global criteria could not be evaluated: {e}");
                self.stamp(plan, result, PlanStatus::Failed, message, Some(e.to_string()))
            }
        }
    }

    /// Evaluates global criteria against the output of every executed step
    /// and stores the verdicts. Returns the first failure, if any.
    async fn evaluate_globals(
        &self,
        plan: &Plan,
        result: &mut PlanExecutionResult,
    ) -> Result<Option<String>> {
        let outcome = aggregate_outcome(result);
        let probes = probe_snapshot(
            &self.probe,
            plan.success_criteria.iter().chain(&plan.failure_criteria),
        )
        .await;

        let verdict = criteria::evaluate_all(
            &plan.success_criteria,
            &plan.failure_criteria,
            &outcome,
            &probes,
        )?;
        let failure = if verdict.passed() {
            None
        } else {
            Some(
                verdict
                    .first_failure()
                    .map(|r| format!("{}: {}", r.description, r.message))
                    .unwrap_or_else(|| "unknown".to_string()),
            )
        };
        result.global_success_results = verdict.success_results;
        result.global_failure_results = verdict.failure_results;
        Ok(failure)
    }

    async fn over_budget(
        &self,
        plan: &Plan,
        result: PlanExecutionResult,
        next_step: &str,
    ) -> PlanExecutionResult {
        let error = plan_budget_error(plan);
        warn!("Not starting step '{next_step}': {error}");
        let message = format!("Stopped before step '{next_step}': {error}");
        self.conclude(plan, result, PlanStatus::Failed, message, Some(error.to_string()))
            .await
    }

    fn suspend(
        &self,
        mut result: PlanExecutionResult,
        step_index: usize,
        step_id: String,
        instructions: String,
    ) -> PlanExecutionResult {
        info!("Waiting for confirmation at step '{step_id}'");
        self.events.emit(ProgressEvent::CheckpointReached {
            step_id: step_id.clone(),
            instructions: instructions.clone(),
        });
        result.status = PlanStatus::AwaitingConfirmation;
        result.message = format!("Waiting for confirmation at step '{step_id}'");
        result.pending_checkpoint = Some(PendingCheckpoint {
            step_id,
            step_index,
            instructions,
        });
        result
    }

    /// Ends a run early. Global criteria are still evaluated over the steps
    /// that ran, but cannot change `status`.
    async fn conclude(
        &self,
        plan: &Plan,
        mut result: PlanExecutionResult,
        status: PlanStatus,
        message: String,
        error: Option<String>,
    ) -> PlanExecutionResult {
        if let Err(e) = self.evaluate_globals(plan, &mut result).await {
            warn!("Global criteria could not be evaluated: {e}");
        }
        self.stamp(plan, result, status, message, error)
    }

    /// Marks unstarted steps skipped and stamps the terminal status.
    fn stamp(
        &self,
        plan: &Plan,
        mut result: PlanExecutionResult,
        status: PlanStatus,
        message: String,
        error: Option<String>,
    ) -> PlanExecutionResult {
        let executed = result.step_results.len();
        for step in plan.steps.iter().skip(executed) {
            let mut skipped =
                StepExecutionResult::pending(&step.id, &step.command, step.recovery.auto_recovery);
            skipped.status = StepStatus::Skipped;
            result.step_results.push(skipped);
        }

        match status {
            PlanStatus::Completed => info!("Plan '{}' completed: {message}", plan.title),
            _ => warn!("Plan '{}' {}: {message}", plan.title, status.as_str()),
        }
        self.events.emit(ProgressEvent::PlanFinished {
            status,
            message: message.clone(),
        });

        result.status = status;
        result.message = message;
        result.error = error;
        result.pending_checkpoint = None;
        result.ended_at = Some(Timestamp::now());
        result
    }
}

fn plan_budget_error(plan: &Plan) -> RunbookError {
    RunbookError::BudgetExceeded {
        scope: BudgetScope::Plan,
        limit_secs: plan.max_total_time_secs,
    }
}

/// The outcome global criteria are evaluated against: step outputs joined by
/// newlines, exit code 0 only when every executed step exited 0.
fn aggregate_outcome(result: &PlanExecutionResult) -> CommandOutcome {
    let combined = result
        .step_results
        .iter()
        .map(|r| r.output.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let exit_code = if result.step_results.iter().all(|r| r.exit_code == Some(0)) {
        0
    } else {
        1
    };
    CommandOutcome::new(
        combined,
        "",
        exit_code,
        Duration::from_millis(result.total_duration_ms()),
    )
}
