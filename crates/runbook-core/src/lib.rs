//! Core library for the Runbook command execution engine.
//!
//! A [`Plan`] is an ordered list of shell [`Step`]s, each with success and
//! failure criteria. The [`PlanRunner`] executes steps through a
//! [`CommandExecutor`] (local shell or ssh), judges every outcome against the
//! criteria and escalates failures through declared alternatives, the static
//! recovery catalog and fallback commands before giving up.
//!
//! # Layout
//!
//! - **Models** ([`models`]): plans, steps, criteria and execution results
//! - **Evaluation** ([`criteria`], [`alternatives`], [`recovery`]): pure
//!   functions over a [`models::CommandOutcome`]
//! - **Engine** ([`engine`]): step escalation and plan sequencing with
//!   budgets, cancellation and checkpoints
//! - **Transport** ([`transport`]): the executor and filesystem probe seams
//! - **History** ([`history`], [`db`]): SQLite store of finished runs
//! - **Display** ([`display`]): markdown formatting for every result
//!
//! # Quick Start
//!
//! ```rust
//! use runbook_core::{Criterion, Plan, PlanRunner, ShellExecutor, Step};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = Plan::new("Inspect memory").with_step(
//!     Step::new("mem", "Check memory", "free -h")
//!         .with_success(Criterion::contains_text("Mem:"))
//!         .with_failure(Criterion::not_contains_text("error")),
//! );
//!
//! let runner = PlanRunner::builder(ShellExecutor::local()).build();
//! let result = runner.run(&plan).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod alternatives;
pub mod criteria;
pub mod db;
pub mod display;
pub mod engine;
pub mod error;
pub mod history;
pub mod models;
pub mod params;
pub mod recovery;
pub mod transport;

// Re-export commonly used types
pub use db::Database;
pub use display::{
    ClassificationReport, DeleteResult, OperationStatus, Patterns, RunSummaries, ValidationReport,
};
pub use engine::{Confirmation, PlanRunner, ProgressEvent, RunnerBuilder};
pub use error::{BudgetScope, Result, RunbookError};
pub use history::{History, HistoryBuilder};
pub use models::{
    Alternative, CommandOutcome, Criterion, CriterionKind, EnhancedAlternative, Plan,
    PlanExecutionResult, PlanStatus, RecoveryConfig, RunSummary, Step, StepExecutionResult,
    StepStatus, StoredRun,
};
pub use params::{ClassifyOutput, DeleteRun, Id, ListRuns, ResumeRun, RunPlan, ValidatePlan};
pub use recovery::{ErrorPattern, RecoveryStrategy};
pub use transport::{
    CommandExecutor, CommandProbe, CommandRequest, FilesystemProbe, LocalFilesystem,
    ShellExecutor,
};
