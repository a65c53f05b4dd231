//! Run history inserts and queries.

use jiff::Timestamp;
use rusqlite::{params, types::Type, OptionalExtension, Row};

use crate::{
    error::{DatabaseResultExt, Result, RunbookError},
    models::{Plan, PlanExecutionResult, PlanStatus, RunSummary, StoredRun},
};

const INSERT_RUN_SQL: &str = "INSERT INTO runs (plan_id, plan_title, status, started_at, ended_at, total_steps, succeeded_steps, result_json, plan_json, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";
const UPDATE_RUN_SQL: &str = "UPDATE runs SET status = ?2, ended_at = ?3, total_steps = ?4, succeeded_steps = ?5, result_json = ?6, recorded_at = ?7 WHERE id = ?1";
const SELECT_RUN_SQL: &str = "SELECT id, plan_id, plan_title, status, started_at, ended_at, total_steps, succeeded_steps, result_json, recorded_at, plan_json FROM runs WHERE id = ?1";
const DELETE_RUN_SQL: &str = "DELETE FROM runs WHERE id = ?1";
const RUN_SUMMARY_COLUMNS: &str =
    "id, plan_id, plan_title, status, started_at, ended_at, total_steps, succeeded_steps";

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

fn parse_timestamp(row: &Row<'_>, column: usize) -> rusqlite::Result<Timestamp> {
    row.get::<_, String>(column)?
        .parse::<Timestamp>()
        .map_err(|e| conversion_error(column, e))
}

/// Maps the leading summary columns of a row.
fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    let status_str: String = row.get(3)?;
    let status = status_str.parse::<PlanStatus>().map_err(|_| {
        conversion_error(
            3,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid plan status: {status_str}"),
            ),
        )
    })?;

    Ok(RunSummary {
        id: row.get::<_, i64>(0)? as u64,
        plan_id: row.get(1)?,
        plan_title: row.get(2)?,
        status,
        started_at: parse_timestamp(row, 4)?,
        ended_at: row
            .get::<_, Option<String>>(5)?
            .map(|s| s.parse::<Timestamp>().map_err(|e| conversion_error(5, e)))
            .transpose()?,
        total_steps: row.get(6)?,
        succeeded_steps: row.get(7)?,
    })
}

impl super::Database {
    /// Stores a run and returns its summary. Pass the plan for runs that
    /// will be resumed later.
    pub fn insert_run(
        &mut self,
        result: &PlanExecutionResult,
        plan: Option<&Plan>,
    ) -> Result<RunSummary> {
        let result_json = serde_json::to_string(result)?;
        let plan_json = plan.map(serde_json::to_string).transpose()?;
        let tx = self
            .connection
            .transaction()
            .db_context("Failed to begin transaction")?;

        tx.execute(
            INSERT_RUN_SQL,
            params![
                result.plan_id,
                result.plan_title,
                result.status.as_str(),
                result.started_at.to_string(),
                result.ended_at.map(|t| t.to_string()),
                result.step_results.len() as i64,
                result.succeeded_steps() as i64,
                result_json,
                plan_json,
                Timestamp::now().to_string(),
            ],
        )
        .db_context("Failed to insert run")?;

        let id = tx.last_insert_rowid() as u64;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(RunSummary::from_result(id, result))
    }

    /// Retrieves a stored run with its full result.
    pub fn get_run(&self, id: u64) -> Result<Option<StoredRun>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_RUN_SQL)
            .db_context("Failed to prepare query")?;

        let row = stmt
            .query_row(params![id as i64], |row| {
                Ok((
                    summary_from_row(row)?,
                    row.get::<_, String>(8)?,
                    parse_timestamp(row, 9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            })
            .optional()
            .db_context("Failed to query run")?;

        row.map(
            |(summary, result_json, recorded_at, plan_json)| -> Result<StoredRun> {
                Ok(StoredRun {
                    summary,
                    result: serde_json::from_str(&result_json)?,
                    plan: plan_json.as_deref().map(serde_json::from_str).transpose()?,
                    recorded_at,
                })
            },
        )
        .transpose()
    }

    /// Replaces the result of a stored run, as after resuming it. The stored
    /// plan is kept.
    pub fn update_run(&mut self, id: u64, result: &PlanExecutionResult) -> Result<RunSummary> {
        let result_json = serde_json::to_string(result)?;
        let updated = self
            .connection
            .execute(
                UPDATE_RUN_SQL,
                params![
                    id as i64,
                    result.status.as_str(),
                    result.ended_at.map(|t| t.to_string()),
                    result.step_results.len() as i64,
                    result.succeeded_steps() as i64,
                    result_json,
                    Timestamp::now().to_string(),
                ],
            )
            .db_context("Failed to update run")?;
        if updated == 0 {
            return Err(RunbookError::RunNotFound { id });
        }
        Ok(RunSummary::from_result(id, result))
    }

    /// Lists run summaries, newest first.
    pub fn list_runs(
        &self,
        status: Option<PlanStatus>,
        limit: Option<u32>,
    ) -> Result<Vec<RunSummary>> {
        let mut query = format!("SELECT {RUN_SUMMARY_COLUMNS} FROM runs");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = status {
            query.push_str(" WHERE status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        query.push_str(" ORDER BY id DESC");

        if let Some(limit) = limit {
            query.push_str(" LIMIT ?");
            params_vec.push(Box::new(i64::from(limit)));
        }

        let mut stmt = self
            .connection
            .prepare(&query)
            .db_context("Failed to prepare query")?;

        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| &**b).collect();

        let runs = stmt
            .query_map(&params_refs[..], summary_from_row)
            .db_context("Failed to query runs")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .db_context("Failed to read runs");
        runs
    }

    /// Deletes a stored run. Returns whether a row was removed.
    pub fn delete_run(&mut self, id: u64) -> Result<bool> {
        let deleted = self
            .connection
            .execute(DELETE_RUN_SQL, params![id as i64])
            .db_context("Failed to delete run")?;
        Ok(deleted > 0)
    }
}
