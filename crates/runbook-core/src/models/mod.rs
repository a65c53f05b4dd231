//! Data models for plans, steps and their execution results.
//!
//! Plans and steps are read-only configuration owned by the caller. Results
//! are produced by the engine and handed back once a run stops. Display
//! implementations live in [`crate::display`].
//!
//! # Examples
//!
//! ```rust
//! use runbook_core::models::{Criterion, Plan, Step};
//!
//! let plan = Plan::new("Inspect host").with_step(
//!     Step::new("memory", "Check memory", "free -h")
//!         .with_success(Criterion::contains_text("Mem:"))
//!         .with_failure(Criterion::not_contains_text("error")),
//! );
//! assert!(plan.validate().is_ok());
//!
//! let json = serde_json::to_string(&plan).unwrap();
//! assert!(json.contains("\"containsText\""));
//! ```

pub mod alternative;
pub mod criterion;
pub mod outcome;
pub mod plan;
pub mod result;
pub mod status;
pub mod step;
pub mod summary;

#[cfg(test)]
mod tests;

pub use alternative::{Alternative, EnhancedAlternative};
pub use criterion::{Comparison, Criterion, CriterionKind, LengthRule, PathKind};
pub use outcome::CommandOutcome;
pub use plan::Plan;
pub use result::{
    CriterionResult, PendingCheckpoint, PlanExecutionResult, RecoveryAttempt, StepExecutionResult,
};
pub use status::{PlanStatus, StepStatus};
pub use step::{Checkpoint, RecoveryConfig, Step};
pub use summary::{RunSummary, StoredRun};
