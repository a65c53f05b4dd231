//! MCP server implementation for runbook
//!
//! Exposes plan validation, execution, output classification and the run
//! history as tools over stdio.


use anyhow::Result;
use log::{debug, error, info};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use runbook_core::History;
use tokio::signal::unix::{signal, SignalKind};

pub mod errors;
pub mod handlers;

pub use handlers::{
    ClassifyOutput, DeleteRun, Id, ListRuns, McpResult, ResumeRun, RunPlan, ValidatePlan,
};

/// MCP server for runbook
#[derive(Clone)]
pub struct RunbookMcpServer {
    history: History,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RunbookMcpServer {
    pub fn new(history: History) -> Self {
        Self {
            history,
            tool_router: Self::tool_router(),
        }
    }

    fn handlers(&self) -> handlers::McpHandlers {
        handlers::McpHandlers::new(self.history.clone())
    }

    #[tool(
        name = "validate_plan",
        description = "Check a plan document without running it. Pass the plan as a JSON string. Reports structural problems (empty or duplicate step ids, zero timeouts, invalid regex triggers) or an outline of the steps when the plan is valid."
    )]
    async fn validate_plan(&self, params: Parameters<ValidatePlan>) -> McpResult {
        self.handlers().validate_plan(params).await
    }

    #[tool(
        name = "run_plan",
        description = "Execute a plan document locally or over ssh (set ssh to user@host). Failed steps are retried with matching alternatives, enhanced fallbacks and automatic recovery. A step with a checkpoint suspends the run with status AWAITING_CONFIRMATION unless approve_checkpoints=true; the suspended run is stored and continued with resume_run. Finished runs are stored in the run history unless record=false."
    )]
    async fn run_plan(&self, params: Parameters<RunPlan>) -> McpResult {
        self.handlers().run_plan(params).await
    }

    #[tool(
        name = "resume_run",
        description = "Continue a stored run suspended at a checkpoint. Steps that already ran are not repeated. approve=true marks the checkpoint step successful and runs the remaining steps; approve=false fails the run. Pass ssh again when the run targets a remote host."
    )]
    async fn resume_run(&self, params: Parameters<ResumeRun>) -> McpResult {
        self.handlers().resume_run(params).await
    }

    #[tool(
        name = "classify_output",
        description = "Classify command output against the built-in error catalog (commandNotFound, permissionDenied, connectionFailed, timeout, ...). Provide the command as well to preview the recovery commands that would be tried."
    )]
    async fn classify_output(&self, params: Parameters<ClassifyOutput>) -> McpResult {
        self.handlers().classify_output(params).await
    }

    #[tool(
        name = "list_runs",
        description = "List stored plan runs, newest first. Filter by final status (COMPLETED, FAILED, CANCELLED, AWAITING_CONFIRMATION) and limit the number of results."
    )]
    async fn list_runs(&self, params: Parameters<ListRuns>) -> McpResult {
        self.handlers().list_runs(params).await
    }

    #[tool(
        name = "show_run",
        description = "Show a stored run by ID with every step result, recovery attempt and criterion outcome."
    )]
    async fn show_run(&self, params: Parameters<Id>) -> McpResult {
        self.handlers().show_run(params).await
    }

    #[tool(
        name = "delete_run",
        description = "Permanently delete a stored run. Requires confirmed=true. This operation cannot be undone."
    )]
    async fn delete_run(&self, params: Parameters<DeleteRun>) -> McpResult {
        self.handlers().delete_run(params).await
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for RunbookMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "runbook".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(r#"Runbook executes declarative plans of shell commands and recovers from common failures.

## Plans
A plan is a JSON document with an id, a title and ordered steps. Each step has an id, a title, a command and optional success_criteria, failure_criteria, alternatives, enhanced_alternatives, recovery settings and a checkpoint.

## Workflow
1. Check the document with `validate_plan`
2. Execute it with `run_plan`, locally or with `ssh` set
3. When the run stops at a checkpoint, verify the instructions and call `resume_run` with the recorded run id and approve=true (or approve=false to stop)
4. Review earlier runs with `list_runs` and `show_run`

## Diagnosing failures
`classify_output` reports which error patterns a command output matches and which recovery commands would be tried."#.to_string()),
            ..Default::default()
        }
    }
}

/// Run the MCP server with stdio transport
pub async fn run_stdio_server(server: RunbookMcpServer) -> Result<()> {
    use rmcp::{transport::stdio, ServiceExt};

    info!(
        "Starting runbook MCP server on stdio (history at {})",
        server.history.database_path().display()
    );
    debug!(
        "Server created with {} tools",
        server.tool_router.list_all().len()
    );

    let service = server.serve(stdio()).await.inspect_err(|e| {
        error!("serving error: {e:?}");
    })?;

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = service.waiting() => {
            match result {
                Ok(_) => info!("MCP server stopped normally"),
                Err(e) => error!("MCP server error: {e:?}"),
            }
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    info!("MCP server shutdown complete");
    Ok(())
}
