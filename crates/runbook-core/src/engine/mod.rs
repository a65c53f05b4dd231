//! The execution engine: step executor, plan orchestrator and progress
//! events.

pub mod events;
pub mod runner;
pub mod step;

pub use events::ProgressEvent;
pub use runner::{Confirmation, PlanRunner, RunnerBuilder};
pub use step::{StepExecutor, StepReport};
