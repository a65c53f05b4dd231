//! Runs one step to a terminal status.
//!
//! The order of escalation is fixed: the step command, then the first
//! matching alternative, then catalog recovery strategies, then the fallback
//! commands of an enhanced alternative. The first attempt whose criteria pass
//! ends the step.

use std::collections::BTreeMap;
use std::iter;
use std::time::Duration;

use jiff::Timestamp;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, ProgressEvent};
use crate::{
    alternatives::{self, MatchedAlternative},
    criteria::{self, ProbeSnapshot, Verdict},
    error::{BudgetScope, Result, RunbookError},
    models::{
        CommandOutcome, Criterion, Plan, RecoveryAttempt, Step, StepExecutionResult, StepStatus,
    },
    recovery::{self, RecoveryContext, RecoveryStrategy},
    transport::{CommandExecutor, CommandRequest, FilesystemProbe},
};

/// What running a step produced.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub result: StepExecutionResult,
    /// Alternative applications taken from the plan retry budget
    pub retries_used: u32,
    /// Cancellation was observed before a recovery attempt
    pub cancelled: bool,
}

/// An executed command together with its verdict.
struct Judged {
    command: String,
    outcome: CommandOutcome,
    verdict: Verdict,
    transport_error: Option<String>,
}

impl Judged {
    fn passed(&self) -> bool {
        self.transport_error.is_none() && self.verdict.passed()
    }

    fn failure_message(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        self.transport_error.clone().or_else(|| {
            self.verdict
                .first_failure()
                .map(|r| format!("{}: {}", r.description, r.message))
        })
    }
}

enum Recovery {
    Recovered {
        strategy: RecoveryStrategy,
        judged: Judged,
    },
    Exhausted,
    Cancelled,
}

struct StepState {
    result: StepExecutionResult,
    spent: Duration,
    retries_left: u32,
    retries_used: u32,
}

impl StepState {
    fn spend(&mut self, duration: Duration) {
        self.spent += duration;
    }

    fn take_retry(&mut self) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        self.retries_used += 1;
        self.result.retry_count += 1;
        true
    }
}

/// Drives a single step through the command executor.
pub struct StepExecutor<'r, E, P> {
    executor: &'r E,
    probe: &'r P,
    events: &'r EventSink,
    cancel: &'r CancellationToken,
}

impl<'r, E: CommandExecutor, P: FilesystemProbe> StepExecutor<'r, E, P> {
    pub(crate) fn new(
        executor: &'r E,
        probe: &'r P,
        events: &'r EventSink,
        cancel: &'r CancellationToken,
    ) -> Self {
        Self {
            executor,
            probe,
            events,
            cancel,
        }
    }

    /// Runs `step` of `plan` with `retry_budget` alternative applications
    /// left in the plan.
    ///
    /// # Errors
    ///
    /// Only configuration errors (such as a regex that does not compile) and
    /// executor errors other than transport failures are returned. Everything
    /// else ends up in the report.
    pub async fn execute(&self, plan: &Plan, step: &Step, retry_budget: u32) -> Result<StepReport> {
        let env = merged_env(plan, step);
        let command = compose(plan, step, &step.command);

        let mut result =
            StepExecutionResult::pending(&step.id, &command, step.recovery.auto_recovery);
        result.status = StepStatus::Executing;
        let mut state = StepState {
            result,
            spent: Duration::ZERO,
            retries_left: retry_budget,
            retries_used: 0,
        };

        info!("Executing step '{}': {}", step.id, command);
        let mut last = self.judge(step, command, &env, step.timeout()).await?;
        state.spend(last.outcome.duration());
        if last.passed() {
            return Ok(self.finish(step, state, last, None, false));
        }

        let matched = if last.transport_error.is_none() {
            alternatives::resolve(step, &last.outcome)?
        } else {
            None
        };

        if let Some(alternative) = matched {
            state.result.matched_alternative = Some(alternative.trigger().to_string());
            for _ in 0..alternative.max_attempts() {
                if !state.take_retry() {
                    warn!(
                        "Retry budget exhausted, not applying alternative on step '{}'",
                        step.id
                    );
                    break;
                }
                let rerun = alternative
                    .rerun_command(&step.command)
                    .map(|c| compose(plan, step, &c));
                info!(
                    "Applying alternative /{}/ on step '{}'",
                    alternative.trigger(),
                    step.id
                );
                self.events.emit(ProgressEvent::AlternativeApplied {
                    step_id: step.id.clone(),
                    trigger: alternative.trigger().to_string(),
                    command: rerun
                        .clone()
                        .unwrap_or_else(|| alternative.apply().join(" && ")),
                });

                if let Some(broken) = self.apply(plan, step, &env, alternative, &mut state).await? {
                    last = broken;
                    break;
                }
                if alternative.delay_ms() > 0 {
                    let delay = Duration::from_millis(alternative.delay_ms());
                    tokio::time::sleep(delay).await;
                    state.spend(delay);
                }
                let Some(rerun) = rerun else {
                    break;
                };

                last = self.judge(step, rerun, &env, step.timeout()).await?;
                state.spend(last.outcome.duration());
                if last.passed() {
                    return Ok(self.finish(step, state, last, None, false));
                }
                if last.transport_error.is_some() {
                    break;
                }
            }
        }

        if !step.recovery.auto_recovery {
            debug!("Auto-recovery disabled for step '{}'", step.id);
        } else if last.verdict.guard_tripped() && last.transport_error.is_none() {
            info!(
                "Failure criterion tripped on step '{}', skipping recovery strategies",
                step.id
            );
        } else {
            match self.recover(plan, step, &env, &mut state, &last, matched).await? {
                Recovery::Recovered { strategy, judged } => {
                    return Ok(self.finish(step, state, judged, Some(strategy), false));
                }
                Recovery::Cancelled => return Ok(self.finish(step, state, last, None, true)),
                Recovery::Exhausted => {}
            }
        }

        if last.transport_error.is_none() {
            let fallbacks = matched.map(|m| m.fallback_commands()).unwrap_or_default();
            for fallback in fallbacks {
                info!("Running fallback on step '{}': {}", step.id, fallback);
                let judged = self
                    .judge(step, compose(plan, step, fallback), &env, step.timeout())
                    .await?;
                state.spend(judged.outcome.duration());
                if judged.passed() {
                    return Ok(self.finish(step, state, judged, None, false));
                }
                let broken = judged.transport_error.is_some();
                last = judged;
                if broken {
                    break;
                }
            }
        }

        Ok(self.finish(step, state, last, None, false))
    }

    /// Runs the `apply` commands of an alternative. A failing apply command
    /// is logged and the rerun still happens. Returns the judged outcome when
    /// the transport broke.
    async fn apply(
        &self,
        plan: &Plan,
        step: &Step,
        env: &BTreeMap<String, String>,
        alternative: MatchedAlternative<'_>,
        state: &mut StepState,
    ) -> Result<Option<Judged>> {
        for command in alternative.apply() {
            let command = compose(plan, step, command);
            let (outcome, transport_error) = self.invoke(&command, env, step.timeout()).await?;
            state.spend(outcome.duration());
            if transport_error.is_some() {
                return self
                    .assess(step, command, outcome, transport_error)
                    .await
                    .map(Some);
            }
            if !outcome.succeeded() {
                debug!(
                    "Apply command exited with {} on step '{}': {}",
                    outcome.exit_code, step.id, command
                );
            }
        }
        Ok(None)
    }

    async fn recover(
        &self,
        plan: &Plan,
        step: &Step,
        env: &BTreeMap<String, String>,
        state: &mut StepState,
        failure: &Judged,
        matched: Option<MatchedAlternative<'_>>,
    ) -> Result<Recovery> {
        let mut candidates: Vec<RecoveryStrategy> = recovery::primary(&failure.outcome)
            .map(|pattern| recovery::strategies_for(pattern).to_vec())
            .unwrap_or_default();
        for extra in matched.map(|m| m.strategies()).unwrap_or_default() {
            if !candidates.contains(extra) {
                candidates.push(*extra);
            }
        }
        if failure.transport_error.is_some() {
            candidates.retain(RecoveryStrategy::survives_transport_failure);
        }
        if candidates.is_empty() {
            debug!("No recovery strategy applies to step '{}'", step.id);
            return Ok(Recovery::Exhausted);
        }

        let budget = step.recovery.timeout();
        let context = RecoveryContext {
            command: &step.command,
            outcome: &failure.outcome,
            step_timeout: step.timeout(),
        };
        let mut spent = Duration::ZERO;
        let mut attempts = 0;

        for strategy in candidates {
            if attempts >= step.recovery.max_attempts {
                debug!("Recovery attempts exhausted on step '{}'", step.id);
                break;
            }
            if spent >= budget {
                warn!(
                    "Step '{}': {}",
                    step.id,
                    RunbookError::BudgetExceeded {
                        scope: BudgetScope::Recovery,
                        limit_secs: step.recovery.timeout_secs,
                    }
                );
                break;
            }
            if self.cancel.is_cancelled() {
                info!("Cancelled before recovery of step '{}'", step.id);
                return Ok(Recovery::Cancelled);
            }

            let Some(action) = strategy.synthesize(&context) else {
                debug!("{strategy} has nothing to try for step '{}'", step.id);
                continue;
            };
            if action.delay >= budget - spent {
                debug!(
                    "Skipping {strategy} on step '{}': its delay exceeds the remaining recovery time",
                    step.id
                );
                continue;
            }
            if !action.delay.is_zero() {
                tokio::time::sleep(action.delay).await;
                spent += action.delay;
                state.spend(action.delay);
            }

            // Every attempt, including its timeout, must fit in the recovery budget.
            let timeout = action.timeout.min(budget - spent);
            let command = compose(plan, step, &action.command);
            debug!("Trying {strategy} on step '{}': {command}", step.id);
            let judged = self.judge(step, command, env, timeout).await?;
            attempts += 1;
            spent += judged.outcome.duration();
            state.spend(judged.outcome.duration());

            let attempt = RecoveryAttempt {
                timestamp: Timestamp::now(),
                strategy,
                command: judged.command.clone(),
                success: judged.passed(),
                output: judged.outcome.combined.clone(),
                error: judged.failure_message(),
                duration_ms: judged.outcome.duration_ms,
            };
            state.result.recovery_attempts.push(attempt.clone());
            self.events.emit(ProgressEvent::RecoveryAttempted {
                step_id: step.id.clone(),
                attempt,
            });

            if judged.passed() {
                info!("Step '{}' recovered with {strategy}", step.id);
                return Ok(Recovery::Recovered { strategy, judged });
            }
            warn!("{strategy} did not recover step '{}'", step.id);
        }

        Ok(Recovery::Exhausted)
    }

    /// Runs a command, turning transport errors into a synthetic outcome.
    async fn invoke(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<(CommandOutcome, Option<String>)> {
        let request = CommandRequest::new(command, timeout).with_env(env.clone());
        match self.executor.run(&request).await {
            Ok(outcome) => Ok((outcome, None)),
            Err(RunbookError::Transport { message }) => {
                warn!("Transport failure running '{command}': {message}");
                Ok((CommandOutcome::transport_failure(&message), Some(message)))
            }
            Err(e) => Err(e),
        }
    }

    async fn judge(
        &self,
        step: &Step,
        command: String,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Judged> {
        let (outcome, transport_error) = self.invoke(&command, env, timeout).await?;
        self.assess(step, command, outcome, transport_error).await
    }

    async fn assess(
        &self,
        step: &Step,
        command: String,
        outcome: CommandOutcome,
        transport_error: Option<String>,
    ) -> Result<Judged> {
        let probes = if transport_error.is_some() {
            ProbeSnapshot::new()
        } else {
            probe_snapshot(
                self.probe,
                step.success_criteria.iter().chain(&step.failure_criteria),
            )
            .await
        };
        let verdict = criteria::evaluate_step(step, &outcome, &probes)?;
        Ok(Judged {
            command,
            outcome,
            verdict,
            transport_error,
        })
    }

    fn finish(
        &self,
        step: &Step,
        state: StepState,
        judged: Judged,
        strategy: Option<RecoveryStrategy>,
        cancelled: bool,
    ) -> StepReport {
        let mut result = state.result;
        result.record_outcome(&judged.command, &judged.outcome);
        result.error = if cancelled {
            Some("cancelled before recovery completed".to_string())
        } else {
            judged.failure_message()
        };
        result.status = match (judged.passed() && !cancelled, &step.checkpoint) {
            (true, Some(_)) => StepStatus::AwaitingConfirmation,
            (true, None) => StepStatus::Success,
            (false, _) => StepStatus::Failed,
        };
        result.success_results = judged.verdict.success_results;
        result.failure_results = judged.verdict.failure_results;
        result.successful_strategy = strategy;
        result.duration_ms = state.spent.as_millis() as u64;
        result.ended_at = Timestamp::now();

        match result.status {
            StepStatus::Failed => warn!(
                "Step '{}' failed after {} recovery attempts",
                step.id,
                result.recovery_attempts_count()
            ),
            status => info!("Step '{}' finished: {}", step.id, status.as_str()),
        }
        self.events.emit(ProgressEvent::StepFinished {
            step_id: step.id.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
        });

        StepReport {
            result,
            retries_used: state.retries_used,
            cancelled,
        }
    }
}

/// Resolves the filesystem facts the given criteria need. Probe failures are
/// logged and leave the path unprobed.
pub(crate) async fn probe_snapshot<'a, P: FilesystemProbe>(
    probe: &P,
    criteria: impl IntoIterator<Item = &'a Criterion>,
) -> ProbeSnapshot {
    let mut snapshot = ProbeSnapshot::new();
    for (path, kind) in ProbeSnapshot::targets(criteria) {
        match probe.exists(&path, kind).await {
            Ok(exists) => snapshot.record(path, kind, exists),
            Err(e) => warn!("Could not probe '{path}': {e}"),
        }
    }
    snapshot
}

/// Plan pre-commands, then step pre-commands, then the command, chained
/// with `&&`.
pub(crate) fn compose(plan: &Plan, step: &Step, command: &str) -> String {
    plan.pre_commands
        .iter()
        .chain(&step.pre_commands)
        .map(String::as_str)
        .chain(iter::once(command))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Plan environment overridden by the step environment.
pub(crate) fn merged_env(plan: &Plan, step: &Step) -> BTreeMap<String, String> {
    let mut env = plan.environment.clone();
    env.extend(step.environment.clone());
    env
}
