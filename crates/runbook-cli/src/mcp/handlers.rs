//! MCP tool handlers implementation

use runbook_core::{
    display::{ClassificationReport, DeleteResult, RunSummaries, ValidationReport},
    params as core, CommandExecutor, CommandProbe, Confirmation, FilesystemProbe, History, Plan,
    PlanExecutionResult, PlanRunner, PlanStatus, RunbookError, ShellExecutor,
};
use log::debug;
use rmcp::{
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    ErrorData,
};
use schemars::JsonSchema;
use serde::Deserialize;

use super::errors::to_mcp_error;

// The wrapper adds the MCP-side derives to core parameter types.
// `#[serde(transparent)]` keeps the wire format identical to the core type.

/// Generic MCP wrapper for core parameter types with serde integration
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct McpParams<T>(T)
where
    T: JsonSchema;

impl<T> JsonSchema for McpParams<T>
where
    T: JsonSchema,
{
    fn schema_name() -> std::borrow::Cow<'static, str> {
        T::schema_name()
    }

    fn json_schema(g: &mut schemars::SchemaGenerator) -> schemars::Schema {
        T::json_schema(g)
    }
}

impl<T> AsRef<T> for McpParams<T>
where
    T: JsonSchema,
{
    fn as_ref(&self) -> &T {
        &self.0
    }
}

pub type Id = McpParams<core::Id>;
pub type RunPlan = McpParams<core::RunPlan>;
pub type ValidatePlan = McpParams<core::ValidatePlan>;
pub type ClassifyOutput = McpParams<core::ClassifyOutput>;
pub type ListRuns = McpParams<core::ListRuns>;
pub type DeleteRun = McpParams<core::DeleteRun>;
pub type ResumeRun = McpParams<core::ResumeRun>;

pub type McpResult = Result<CallToolResult, ErrorData>;

fn text(body: String) -> McpResult {
    Ok(CallToolResult::success(vec![Content::text(body)]))
}

/// Handler implementations for the MCP server
pub struct McpHandlers {
    history: History,
}

impl McpHandlers {
    pub fn new(history: History) -> Self {
        Self { history }
    }

    pub async fn validate_plan(&self, Parameters(params): Parameters<ValidatePlan>) -> McpResult {
        debug!("validate_plan: {} bytes", params.as_ref().plan.len());

        let plan = Plan::from_json_str(&params.as_ref().plan)
            .map_err(|e| to_mcp_error("Invalid plan", &e))?;
        text(ValidationReport::new(&plan).to_string())
    }

    pub async fn run_plan(&self, Parameters(params): Parameters<RunPlan>) -> McpResult {
        let params = params.as_ref();
        debug!("run_plan: ssh={:?}", params.ssh);

        let plan =
            Plan::from_json_str(&params.plan).map_err(|e| to_mcp_error("Invalid plan", &e))?;
        let start = Start::Fresh {
            approve: params.approve_checkpoints,
        };
        let result = execute_on(params.ssh.as_deref(), &plan, start)
            .await
            .map_err(|e| to_mcp_error("Failed to run plan", &e))?;

        let mut body = String::new();
        if result.status == PlanStatus::AwaitingConfirmation {
            // Suspended runs are always stored, resuming needs them.
            let summary = self
                .history
                .record_resumable_run(&plan, &result)
                .await
                .map_err(|e| to_mcp_error("Failed to record run", &e))?;
            body.push_str(&checkpoint_hint(summary.id));
        } else if params.record {
            let summary = self
                .history
                .record_run(&result)
                .await
                .map_err(|e| to_mcp_error("Failed to record run", &e))?;
            body.push_str(&format!("Recorded as run {}\n\n", summary.id));
        }
        body.push_str(&result.to_string());
        text(body)
    }

    pub async fn resume_run(&self, Parameters(params): Parameters<ResumeRun>) -> McpResult {
        let params = params.as_ref();
        debug!("resume_run: {:?}", params);

        let id = params.id;
        let stored = self
            .history
            .get_run(&core::Id { id })
            .await
            .map_err(|e| to_mcp_error("Failed to get run", &e))?
            .ok_or_else(|| to_mcp_error("Failed to get run", &RunbookError::RunNotFound { id }))?;
        let plan = stored.plan.ok_or_else(|| {
            to_mcp_error(
                "Cannot resume run",
                &RunbookError::invalid_input("id")
                    .with_reason(format!("run {id} was recorded without its plan")),
            )
        })?;

        let confirmation = if params.approve {
            Confirmation::Approved
        } else {
            Confirmation::Rejected
        };
        let start = Start::Resume {
            suspended: stored.result,
            confirmation,
        };
        let result = execute_on(params.ssh.as_deref(), &plan, start)
            .await
            .map_err(|e| to_mcp_error("Failed to resume run", &e))?;
        self.history
            .update_run(id, &result)
            .await
            .map_err(|e| to_mcp_error("Failed to record run", &e))?;

        let mut body = if result.status == PlanStatus::AwaitingConfirmation {
            checkpoint_hint(id)
        } else {
            format!("Updated run {id}\n\n")
        };
        body.push_str(&result.to_string());
        text(body)
    }

    pub async fn classify_output(
        &self,
        Parameters(params): Parameters<ClassifyOutput>,
    ) -> McpResult {
        debug!("classify_output: exit_code={:?}", params.as_ref().exit_code);
        text(ClassificationReport::new(params.as_ref()).to_string())
    }

    pub async fn list_runs(&self, Parameters(params): Parameters<ListRuns>) -> McpResult {
        debug!("list_runs: {:?}", params);

        let runs = self
            .history
            .list_runs(params.as_ref())
            .await
            .map_err(|e| to_mcp_error("Failed to list runs", &e))?;
        text(RunSummaries(runs).to_string())
    }

    pub async fn show_run(&self, Parameters(params): Parameters<Id>) -> McpResult {
        debug!("show_run: {:?}", params);

        let id = params.as_ref().id;
        let stored = self
            .history
            .get_run(params.as_ref())
            .await
            .map_err(|e| to_mcp_error("Failed to get run", &e))?
            .ok_or_else(|| to_mcp_error("Failed to get run", &RunbookError::RunNotFound { id }))?;
        text(format!("{}\n{}", stored.summary, stored.result))
    }

    pub async fn delete_run(&self, Parameters(params): Parameters<DeleteRun>) -> McpResult {
        debug!("delete_run: {:?}", params);

        let deleted = self
            .history
            .delete_run(params.as_ref())
            .await
            .map_err(|e| to_mcp_error("Failed to delete run", &e))?;
        text(DeleteResult::new(deleted).to_string())
    }
}

fn checkpoint_hint(id: u64) -> String {
    format!(
        "Recorded as run {id}. The run stopped at a checkpoint. Verify the \
         instructions, then call resume_run with id={id} and approve=true to \
         continue or approve=false to stop.\n\n"
    )
}

/// Where a run starts from.
enum Start {
    Fresh {
        /// Approve every checkpoint instead of suspending
        approve: bool,
    },
    Resume {
        suspended: PlanExecutionResult,
        confirmation: Confirmation,
    },
}

/// Runs the plan locally or over ssh.
async fn execute_on(
    ssh: Option<&str>,
    plan: &Plan,
    start: Start,
) -> Result<PlanExecutionResult, RunbookError> {
    match ssh {
        Some(destination) => {
            let executor = ShellExecutor::ssh(destination);
            let runner = PlanRunner::builder(executor.clone())
                .with_probe(CommandProbe::new(executor))
                .build();
            execute(&runner, plan, start).await
        }
        None => {
            let runner = PlanRunner::builder(ShellExecutor::local()).build();
            execute(&runner, plan, start).await
        }
    }
}

async fn execute<E, P>(
    runner: &PlanRunner<E, P>,
    plan: &Plan,
    start: Start,
) -> Result<PlanExecutionResult, RunbookError>
where
    E: CommandExecutor,
    P: FilesystemProbe,
{
    let (mut result, approve) = match start {
        Start::Fresh { approve } => (runner.run(plan).await?, approve),
        Start::Resume {
            suspended,
            confirmation,
        } => (runner.resume(plan, suspended, confirmation).await?, false),
    };
    while approve && result.status == PlanStatus::AwaitingConfirmation {
        result = runner.resume(plan, result, Confirmation::Approved).await?;
    }
    Ok(result)
}
