//! Status enumerations for plan runs and steps.
//!
//! The serialized names are part of the persisted result format and must not
//! change.

use std::str::FromStr;

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of a plan run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    /// Plan is built but not started
    #[default]
    Planning,

    /// Steps are running
    Executing,

    /// All steps and global criteria passed
    Completed,

    /// A step failed, a budget ran out, or global criteria failed
    Failed,

    /// Cancellation was observed between steps
    Cancelled,

    /// A checkpoint step is waiting for manual confirmation
    AwaitingConfirmation,
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLANNING" => Ok(PlanStatus::Planning),
            "EXECUTING" => Ok(PlanStatus::Executing),
            "COMPLETED" => Ok(PlanStatus::Completed),
            "FAILED" => Ok(PlanStatus::Failed),
            "CANCELLED" => Ok(PlanStatus::Cancelled),
            "AWAITING_CONFIRMATION" => Ok(PlanStatus::AwaitingConfirmation),
            _ => Err(format!("Invalid plan status: {s}")),
        }
    }
}

impl PlanStatus {
    /// Stable string representation used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Planning => "PLANNING",
            PlanStatus::Executing => "EXECUTING",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Cancelled => "CANCELLED",
            PlanStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
        }
    }

    /// Whether the run has reached a state it will never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }

    /// Get status with consistent icon formatting for display.
    pub fn with_icon(&self) -> &'static str {
        match self {
            PlanStatus::Planning => "○ Planning",
            PlanStatus::Executing => "➤ Executing",
            PlanStatus::Completed => "✓ Completed",
            PlanStatus::Failed => "✗ Failed",
            PlanStatus::Cancelled => "⊘ Cancelled",
            PlanStatus::AwaitingConfirmation => "⏸ Awaiting confirmation",
        }
    }
}

/// Lifecycle of a single step: `Pending → Executing → {Success, Failed, Skipped}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Step has not started
    #[default]
    Pending,

    /// Step command or one of its recoveries is running
    Executing,

    /// Criteria passed
    Success,

    /// Every recovery path was exhausted
    Failed,

    /// Step was never started because the run stopped earlier
    Skipped,

    /// Checkpoint step passed and waits for manual confirmation
    AwaitingConfirmation,
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(StepStatus::Pending),
            "EXECUTING" => Ok(StepStatus::Executing),
            "SUCCESS" => Ok(StepStatus::Success),
            "FAILED" => Ok(StepStatus::Failed),
            "SKIPPED" => Ok(StepStatus::Skipped),
            "AWAITING_CONFIRMATION" => Ok(StepStatus::AwaitingConfirmation),
            _ => Err(format!("Invalid step status: {s}")),
        }
    }
}

impl StepStatus {
    /// Stable string representation used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Executing => "EXECUTING",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
        }
    }

    /// Get status with consistent icon formatting for display.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use runbook_core::models::StepStatus;
    ///
    /// assert_eq!(StepStatus::Success.with_icon(), "✓ Success");
    /// assert_eq!(StepStatus::Failed.with_icon(), "✗ Failed");
    /// ```
    pub fn with_icon(&self) -> &'static str {
        match self {
            StepStatus::Pending => "○ Pending",
            StepStatus::Executing => "➤ Executing",
            StepStatus::Success => "✓ Success",
            StepStatus::Failed => "✗ Failed",
            StepStatus::Skipped => "– Skipped",
            StepStatus::AwaitingConfirmation => "⏸ Awaiting confirmation",
        }
    }
}
