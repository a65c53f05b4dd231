//! Execution results produced by the engine.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{CommandOutcome, PlanStatus, StepStatus};
use crate::recovery::RecoveryStrategy;

/// Verdict of one criterion against one outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionResult {
    pub description: String,
    pub passed: bool,
    /// What was actually observed (a count, an exit code, a match)
    pub actual_value: String,
    pub message: String,
}

/// One recovery command that was tried. Never modified once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryAttempt {
    pub timestamp: Timestamp,
    pub strategy: RecoveryStrategy,
    pub command: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Final record of one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepExecutionResult {
    pub step_id: String,
    pub status: StepStatus,
    /// The command whose outcome decided the status
    pub command: String,
    pub output: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    /// Recorded time of every command and delay of the step
    pub duration_ms: u64,
    #[serde(default)]
    pub success_results: Vec<CriterionResult>,
    #[serde(default)]
    pub failure_results: Vec<CriterionResult>,
    /// Alternative applications consumed from the plan retry budget
    pub retry_count: u32,
    /// Trigger of the alternative that matched, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_alternative: Option<String>,
    #[serde(default)]
    pub recovery_attempts: Vec<RecoveryAttempt>,
    pub auto_recovery_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_strategy: Option<RecoveryStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepExecutionResult {
    /// A fresh result for a step that is about to run.
    pub fn pending(step_id: impl Into<String>, command: impl Into<String>, auto_recovery: bool) -> Self {
        let now = Timestamp::now();
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            command: command.into(),
            output: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            started_at: now,
            ended_at: now,
            duration_ms: 0,
            success_results: Vec::new(),
            failure_results: Vec::new(),
            retry_count: 0,
            matched_alternative: None,
            recovery_attempts: Vec::new(),
            auto_recovery_enabled: auto_recovery,
            successful_strategy: None,
            error: None,
        }
    }

    /// Copies the streams and exit code of the deciding outcome.
    pub fn record_outcome(&mut self, command: &str, outcome: &CommandOutcome) {
        self.command = command.to_string();
        self.output = outcome.combined.clone();
        self.stdout = outcome.stdout.clone();
        self.stderr = outcome.stderr.clone();
        self.exit_code = Some(outcome.exit_code);
    }

    pub fn recovery_attempts_count(&self) -> usize {
        self.recovery_attempts.len()
    }

    pub fn successful_recovery(&self) -> bool {
        self.successful_strategy.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// A checkpoint the run is suspended on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingCheckpoint {
    pub step_id: String,
    /// Position of the step in the plan
    pub step_index: usize,
    pub instructions: String,
}

/// Final record of a plan run, handed to the caller once the run stops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanExecutionResult {
    pub plan_id: String,
    pub plan_title: String,
    pub status: PlanStatus,
    pub started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    #[serde(default)]
    pub step_results: Vec<StepExecutionResult>,
    #[serde(default)]
    pub global_success_results: Vec<CriterionResult>,
    #[serde(default)]
    pub global_failure_results: Vec<CriterionResult>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_checkpoint: Option<PendingCheckpoint>,
    /// Alternative applications consumed so far
    #[serde(default)]
    pub retries_used: u32,
}

impl PlanExecutionResult {
    pub fn new(plan_id: impl Into<String>, plan_title: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            plan_title: plan_title.into(),
            status: PlanStatus::Planning,
            started_at: Timestamp::now(),
            ended_at: None,
            step_results: Vec::new(),
            global_success_results: Vec::new(),
            global_failure_results: Vec::new(),
            message: String::new(),
            error: None,
            pending_checkpoint: None,
            retries_used: 0,
        }
    }

    /// Sum of the recorded step durations.
    pub fn total_duration_ms(&self) -> u64 {
        self.step_results.iter().map(|r| r.duration_ms).sum()
    }

    pub fn succeeded_steps(&self) -> usize {
        self.step_results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_step(&self) -> Option<&StepExecutionResult> {
        self.step_results
            .iter()
            .find(|r| r.status == StepStatus::Failed)
    }

    pub fn is_completed(&self) -> bool {
        self.status == PlanStatus::Completed
    }
}
