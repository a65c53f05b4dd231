use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::{ClassifyArgs, HistoryCommands, RunArgs, ValidateArgs};

/// Declarative command runner with failure classification and recovery
///
/// Runbook executes JSON plans of shell steps locally or over ssh, checks
/// every step against its success and failure criteria, and works through
/// declared alternatives and built-in recovery strategies before giving up.
/// Finished runs are kept in a local history. The `serve` command exposes
/// the same operations as an MCP (Model Context Protocol) server.
#[derive(Parser)]
#[command(version, about, name = "rb")]
pub struct Args {
    /// Path to the SQLite history database. Defaults to
    /// $XDG_DATA_HOME/runbook/history.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the Runbook CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Run a plan file
    #[command(alias = "r")]
    Run(RunArgs),
    /// Check a plan file without running it
    #[command(alias = "v")]
    Validate(ValidateArgs),
    /// Classify command output and preview recovery commands
    #[command(alias = "c")]
    Classify(ClassifyArgs),
    /// Inspect stored runs
    #[command(alias = "h")]
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Start the MCP server
    Serve,
}
