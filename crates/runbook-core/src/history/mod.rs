//! Persistent history of plan runs.
//!
//! Every call opens its own connection on a blocking thread, so a
//! [`History`] is cheap to clone and safe to share between tasks.
//!
//! ```rust
//! use runbook_core::{params::ListRuns, HistoryBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let history = HistoryBuilder::new()
//!     .with_database_path(Some("history.db"))
//!     .build()
//!     .await?;
//! let failed = history
//!     .list_runs(&ListRuns {
//!         status: Some("FAILED".parse()?),
//!         limit: Some(10),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tokio::task;

use crate::{
    db::Database,
    error::{Result, RunbookError},
    models::{Plan, PlanExecutionResult, RunSummary, StoredRun},
    params::{DeleteRun, Id, ListRuns},
};

mod builder;

pub use builder::HistoryBuilder;

/// Async facade over the run history database.
#[derive(Debug, Clone)]
pub struct History {
    db_path: PathBuf,
}

impl History {
    pub(crate) fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Stores a run result.
    pub async fn record_run(&self, result: &PlanExecutionResult) -> Result<RunSummary> {
        self.insert(result, None).await
    }

    /// Stores a run together with its plan, so that a run suspended at a
    /// checkpoint can be resumed from the history.
    pub async fn record_resumable_run(
        &self,
        plan: &Plan,
        result: &PlanExecutionResult,
    ) -> Result<RunSummary> {
        self.insert(result, Some(plan.clone())).await
    }

    async fn insert(
        &self,
        result: &PlanExecutionResult,
        plan: Option<Plan>,
    ) -> Result<RunSummary> {
        let db_path = self.db_path.clone();
        let result = result.clone();

        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            db.insert_run(&result, plan.as_ref())
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }

    /// Replaces the stored result of run `id`.
    ///
    /// # Errors
    ///
    /// Returns `RunbookError::RunNotFound` for an unknown ID.
    pub async fn update_run(&self, id: u64, result: &PlanExecutionResult) -> Result<RunSummary> {
        let db_path = self.db_path.clone();
        let result = result.clone();

        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            db.update_run(id, &result)
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }

    /// Lists stored runs, newest first.
    pub async fn list_runs(&self, params: &ListRuns) -> Result<Vec<RunSummary>> {
        let db_path = self.db_path.clone();
        let status = params.status;
        let limit = params.limit;

        task::spawn_blocking(move || {
            let db = Database::new(&db_path)?;
            db.list_runs(status, limit)
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }

    /// Retrieves a stored run by its ID.
    pub async fn get_run(&self, params: &Id) -> Result<Option<StoredRun>> {
        let db_path = self.db_path.clone();
        let id = params.id;

        task::spawn_blocking(move || {
            let db = Database::new(&db_path)?;
            db.get_run(id)
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }

    /// Deletes a stored run and returns what was deleted.
    ///
    /// # Errors
    ///
    /// Refuses with `RunbookError::InvalidInput` unless `params.confirmed` is
    /// set, and returns `RunbookError::RunNotFound` for an unknown ID.
    pub async fn delete_run(&self, params: &DeleteRun) -> Result<RunSummary> {
        if !params.confirmed {
            return Err(RunbookError::invalid_input("confirmed")
                .with_reason("deleting a run is permanent and must be confirmed"));
        }

        let db_path = self.db_path.clone();
        let id = params.id;

        task::spawn_blocking(move || -> Result<RunSummary> {
            let mut db = Database::new(&db_path)?;
            let run = db.get_run(id)?.ok_or(RunbookError::RunNotFound { id })?;
            db.delete_run(id)?;
            Ok(run.summary)
        })
        .await
        .map_err(|e| RunbookError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }
}
