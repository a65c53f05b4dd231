//! Run summary types used by the history store.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{Plan, PlanExecutionResult, PlanStatus};

/// Summary information about a recorded run with step statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// History row ID
    pub id: u64,
    /// Identifier of the plan that was run
    pub plan_id: String,
    /// Title of the plan
    pub plan_title: String,
    /// Terminal status of the run
    pub status: PlanStatus,
    /// When the run started
    pub started_at: Timestamp,
    /// When the run stopped
    pub ended_at: Option<Timestamp>,
    /// Number of steps that produced a result
    pub total_steps: u32,
    /// Number of steps that succeeded
    pub succeeded_steps: u32,
}

impl RunSummary {
    /// Create a RunSummary from a stored row ID and the run's result
    pub fn from_result(id: u64, result: &PlanExecutionResult) -> Self {
        Self {
            id,
            plan_id: result.plan_id.clone(),
            plan_title: result.plan_title.clone(),
            status: result.status,
            started_at: result.started_at,
            ended_at: result.ended_at,
            total_steps: result.step_results.len() as u32,
            succeeded_steps: result.succeeded_steps() as u32,
        }
    }

    pub fn unsuccessful_steps(&self) -> u32 {
        self.total_steps - self.succeeded_steps
    }
}

/// A run as kept in the history store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRun {
    pub summary: RunSummary,
    /// The full result exactly as it was returned by the engine
    pub result: PlanExecutionResult,
    /// The plan that was run, stored with runs suspended at a checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// When the run was written to the history
    pub recorded_at: Timestamp,
}
