//! Command handlers and their clap argument wrappers.
//!
//! Argument structs carry the clap derives and convert into the core
//! parameter types, so `runbook-core` stays free of CLI concerns:
//!
//! ```text
//! User Input → CLI Args (clap) → Core Params → History / PlanRunner
//! ```
//!
//! Progress of a running plan goes to stderr. Reports go to stdout, either
//! rendered markdown or JSON with `--json`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use log::warn;
use runbook_core::{
    display::{Elapsed, RunSummaries},
    params::{ClassifyOutput, DeleteRun, Id, ListRuns},
    ClassificationReport, CommandExecutor, CommandProbe, Confirmation, DeleteResult,
    FilesystemProbe, History, HistoryBuilder, Plan, PlanExecutionResult, PlanRunner, PlanStatus,
    ProgressEvent, RunbookError, ShellExecutor, ValidationReport,
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncReadExt, BufReader, Lines, Stdin},
    sync::mpsc::{self, UnboundedReceiver},
};

use crate::renderer::TerminalRenderer;

/// Run a plan file
///
/// Executes every step in order. Checkpoints ask for confirmation on the
/// terminal unless --yes is given. Ctrl-C stops the run before the next
/// step or recovery attempt. The command fails unless the plan completes.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the plan JSON file
    pub plan: PathBuf,
    /// Run on this ssh destination (user@host or a config alias) instead of
    /// locally
    #[arg(long)]
    pub ssh: Option<String>,
    /// Extra ssh `-o` option such as Port=2222 (repeatable)
    #[arg(long = "ssh-option", value_name = "KEY=VALUE", requires = "ssh")]
    pub ssh_options: Vec<String>,
    /// Approve every checkpoint without asking
    #[arg(short, long)]
    pub yes: bool,
    /// Do not store the result in the run history
    #[arg(long)]
    pub no_record: bool,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Check a plan file without running it
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the plan JSON file
    pub plan: PathBuf,
}

/// Classify command output
///
/// Reports the error patterns detected in the output. With --command, also
/// shows the recovery commands the catalog would try.
#[derive(Args)]
pub struct ClassifyArgs {
    /// Output to classify. Read from stdin when omitted
    pub output: Option<String>,
    /// Exit code of the command
    #[arg(short, long, allow_negative_numbers = true)]
    pub exit_code: Option<i32>,
    /// The command that produced the output
    #[arg(short, long)]
    pub command: Option<String>,
}

impl ClassifyArgs {
    fn into_params(self, output: String) -> ClassifyOutput {
        ClassifyOutput {
            output,
            exit_code: self.exit_code,
            command: self.command,
        }
    }
}

/// List stored runs, newest first
#[derive(Args)]
pub struct ListRunsArgs {
    /// Only runs that ended with this status
    #[arg(short, long)]
    pub status: Option<RunStatusArg>,
    /// Maximum number of runs to show
    #[arg(short, long)]
    pub limit: Option<u32>,
}

impl From<ListRunsArgs> for ListRuns {
    fn from(val: ListRunsArgs) -> Self {
        ListRuns {
            status: val.status.map(Into::into),
            limit: val.limit,
        }
    }
}

/// Show a stored run with every step result
#[derive(Args)]
pub struct ShowRunArgs {
    #[arg(help = "Unique identifier of the run to show")]
    pub id: u64,
    /// Print the stored result as JSON
    #[arg(long)]
    pub json: bool,
}

impl From<&ShowRunArgs> for Id {
    fn from(val: &ShowRunArgs) -> Self {
        Id { id: val.id }
    }
}

/// Delete a stored run permanently
#[derive(Args)]
pub struct DeleteRunArgs {
    #[arg(help = "Unique identifier of the run to delete")]
    pub id: u64,
    /// Confirm the deletion (required to prevent accidental deletion)
    #[arg(long)]
    pub confirm: bool,
}

impl From<DeleteRunArgs> for DeleteRun {
    fn from(val: DeleteRunArgs) -> Self {
        DeleteRun {
            id: val.id,
            confirmed: val.confirm,
        }
    }
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List stored runs
    #[command(aliases = ["l", "ls"])]
    List(ListRunsArgs),
    /// Show a stored run
    #[command(alias = "s")]
    Show(ShowRunArgs),
    /// Delete a stored run
    #[command(aliases = ["d", "rm"])]
    Delete(DeleteRunArgs),
}

/// Final run status accepted by `history list --status`
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RunStatusArg {
    Completed,
    Failed,
    Cancelled,
    AwaitingConfirmation,
}

impl From<RunStatusArg> for PlanStatus {
    fn from(val: RunStatusArg) -> Self {
        match val {
            RunStatusArg::Completed => PlanStatus::Completed,
            RunStatusArg::Failed => PlanStatus::Failed,
            RunStatusArg::Cancelled => PlanStatus::Cancelled,
            RunStatusArg::AwaitingConfirmation => PlanStatus::AwaitingConfirmation,
        }
    }
}

/// Handlers for every CLI command.
pub struct Cli {
    database_file: Option<PathBuf>,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(database_file: Option<PathBuf>, renderer: TerminalRenderer) -> Self {
        Self {
            database_file,
            renderer,
        }
    }

    /// Opens the run history, creating the database on first use.
    pub async fn history(&self) -> Result<History> {
        HistoryBuilder::new()
            .with_database_path(self.database_file.as_ref())
            .build()
            .await
            .context("Failed to initialize run history")
    }

    pub async fn run_plan(&self, args: RunArgs) -> Result<()> {
        let plan = load_plan(&args.plan)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let progress = tokio::spawn(report_progress(receiver));

        let result = match &args.ssh {
            Some(destination) => {
                let executor = args
                    .ssh_options
                    .iter()
                    .fold(ShellExecutor::ssh(destination), |executor, option| {
                        executor.with_ssh_option(option)
                    });
                let runner = PlanRunner::builder(executor.clone())
                    .with_probe(CommandProbe::new(executor))
                    .with_events(sender)
                    .build();
                drive(&runner, &plan, args.yes).await?
            }
            None => {
                let runner = PlanRunner::builder(ShellExecutor::local())
                    .with_events(sender)
                    .build();
                drive(&runner, &plan, args.yes).await?
            }
        };
        progress.await.context("Progress reporter failed")?;

        if !args.no_record {
            let summary = self.history().await?.record_run(&result).await?;
            eprintln!("Recorded as run {}", summary.id);
        }

        if args.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            self.renderer.render(&result.to_string())?;
        }

        if result.status != PlanStatus::Completed {
            bail!("Plan {}: {}", result.status, result.message);
        }
        Ok(())
    }

    pub fn validate_plan(&self, args: &ValidateArgs) -> Result<()> {
        let plan = load_plan(&args.plan)?;
        self.renderer
            .render(&ValidationReport::new(&plan).to_string())
    }

    pub async fn classify_output(&self, mut args: ClassifyArgs) -> Result<()> {
        let output = match args.output.take() {
            Some(output) => output,
            None => {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .context("Failed to read output from stdin")?;
                buffer
            }
        };

        let report = ClassificationReport::new(&args.into_params(output));
        self.renderer.render(&report.to_string())
    }

    pub async fn handle_history_command(&self, command: HistoryCommands) -> Result<()> {
        let history = self.history().await?;
        match command {
            HistoryCommands::List(args) => {
                let runs = history.list_runs(&args.into()).await?;
                self.renderer.render(&RunSummaries(runs).to_string())
            }
            HistoryCommands::Show(args) => {
                let stored = history
                    .get_run(&Id::from(&args))
                    .await?
                    .ok_or(RunbookError::RunNotFound { id: args.id })?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&stored)?);
                    Ok(())
                } else {
                    self.renderer.render(&format!(
                        "{}\n{}",
                        stored.summary, stored.result
                    ))
                }
            }
            HistoryCommands::Delete(args) => {
                let deleted = history.delete_run(&args.into()).await?;
                self.renderer
                    .render(&DeleteResult::new(deleted).to_string())
            }
        }
    }
}

fn load_plan(path: &Path) -> Result<Plan> {
    Plan::from_json_file(path)
        .with_context(|| format!("Failed to load plan from {}", path.display()))
}

/// Runs the plan, answering checkpoints until it reaches a terminal status.
async fn drive<E, P>(
    runner: &PlanRunner<E, P>,
    plan: &Plan,
    approve_all: bool,
) -> Result<PlanExecutionResult>
where
    E: CommandExecutor,
    P: FilesystemProbe,
{
    let token = runner.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping before the next command");
            token.cancel();
        }
    });

    let mut stdin = BufReader::new(io::stdin()).lines();
    let mut result = runner.run(plan).await?;
    while result.status == PlanStatus::AwaitingConfirmation {
        let confirmation = if approve_all {
            Confirmation::Approved
        } else {
            ask_confirmation(&result, &mut stdin).await?
        };
        result = runner.resume(plan, result, confirmation).await?;
    }

    interrupt.abort();
    Ok(result)
}

async fn ask_confirmation(
    result: &PlanExecutionResult,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<Confirmation> {
    if let Some(checkpoint) = &result.pending_checkpoint {
        eprintln!(
            "Checkpoint after step '{}': {}",
            checkpoint.step_id, checkpoint.instructions
        );
    }
    eprint!("Continue? [y/N] ");

    let answer = stdin
        .next_line()
        .await
        .context("Failed to read confirmation")?
        .unwrap_or_default();
    Ok(match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Confirmation::Approved,
        _ => Confirmation::Rejected,
    })
}

async fn report_progress(mut receiver: UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            ProgressEvent::PlanStarted {
                title, total_steps, ..
            } => eprintln!("Running '{title}' ({total_steps} steps)"),
            ProgressEvent::StepStarted {
                index,
                title,
                command,
                ..
            } => eprintln!("[{}] {title}: {command}", index + 1),
            ProgressEvent::AlternativeApplied {
                trigger, command, ..
            } => eprintln!("    alternative /{trigger}/: {command}"),
            ProgressEvent::RecoveryAttempted { attempt, .. } => eprintln!(
                "    {} {}: {}",
                if attempt.success { "✓" } else { "✗" },
                attempt.strategy,
                attempt.command
            ),
            ProgressEvent::StepFinished {
                status,
                duration_ms,
                ..
            } => eprintln!("    {} in {}", status.with_icon(), Elapsed(duration_ms)),
            ProgressEvent::CheckpointReached { .. } | ProgressEvent::PlanFinished { .. } => {}
        }
    }
}
