//! Display formatting for results, plans and the run history.
//!
//! Domain models implement [`std::fmt::Display`] directly (see [`models`]);
//! collections and operation outcomes get newtype wrappers. Everything is
//! markdown so the same text serves the terminal renderer and MCP clients.
//!
//! ```rust
//! use runbook_core::display::OperationStatus;
//!
//! let status = OperationStatus::success("Plan is valid".to_string());
//! assert_eq!(status.to_string(), "Success: Plan is valid\n");
//! ```

pub mod collections;
pub mod datetime;
pub mod models;
pub mod results;
pub mod status;

pub use collections::{Patterns, RunSummaries};
pub use datetime::{Elapsed, LocalDateTime};
pub use results::{ClassificationReport, DeleteResult, ValidationReport};
pub use status::OperationStatus;
