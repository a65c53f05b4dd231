//! Parameter structures for runbook operations.
//!
//! Shared by every interface (CLI, MCP) without framework-specific derives.
//! Interface layers wrap these in their own types (clap `Args`, MCP request
//! structs) and convert with `.into()`, so the core stays free of clap and
//! only pulls in `schemars` behind the `schema` feature.
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   CLI Args      │    │   MCP Params    │    │  Core Params    │
//! │  (clap derives) │───▶│ (serde derives) │───▶│ (minimal deps)  │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::PlanStatus;

/// Generic parameters for operations requiring just an ID.
///
/// Used for show_run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Id {
    /// The ID of the stored run
    pub id: u64,
}

/// Parameters for running a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct RunPlan {
    /// Plan document as JSON
    pub plan: String,
    /// Run over ssh on this destination instead of locally
    #[serde(default)]
    pub ssh: Option<String>,
    /// Approve every checkpoint without asking
    #[serde(default)]
    pub approve_checkpoints: bool,
    /// Store the result in the run history
    #[serde(default = "default_true")]
    pub record: bool,
}

fn default_true() -> bool {
    true
}

/// Parameters for continuing a stored run suspended at a checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct ResumeRun {
    /// The ID of the stored run
    pub id: u64,
    /// Approve the pending checkpoint. False rejects it and fails the run
    pub approve: bool,
    /// Run the remaining steps over ssh on this destination
    #[serde(default)]
    pub ssh: Option<String>,
}

/// Parameters for validating a plan without running it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct ValidatePlan {
    /// Plan document as JSON
    pub plan: String,
}

/// Parameters for classifying raw command output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct ClassifyOutput {
    /// Combined stdout and stderr of the command
    pub output: String,
    /// Exit code of the command, 1 when unknown
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// The command that produced the output, used to preview recovery
    /// commands
    #[serde(default)]
    pub command: Option<String>,
}

/// Parameters for listing stored runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct ListRuns {
    /// Only runs that ended with this status (COMPLETED, FAILED, ...)
    #[serde(default)]
    pub status: Option<PlanStatus>,
    /// Maximum number of runs, newest first
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Parameters for deleting a stored run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct DeleteRun {
    /// The ID of the stored run
    pub id: u64,
    /// Must be true, deletion is permanent
    #[serde(default)]
    pub confirmed: bool,
}
