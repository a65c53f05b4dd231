//! Runbook CLI Application
//!
//! Command-line interface for the runbook execution engine.

mod args;
mod cli;
mod mcp;
mod renderer;

use anyhow::{Context, Result};
use args::{Args, Commands};
use clap::Parser;
use cli::Cli;
use log::info;
use mcp::{run_stdio_server, RunbookMcpServer};
use renderer::TerminalRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        no_color,
        command,
    } = Args::parse();

    let cli = Cli::new(database_file, TerminalRenderer::new(!no_color));

    info!("Runbook started");

    match command {
        Commands::Run(args) => cli.run_plan(args).await,
        Commands::Validate(args) => cli.validate_plan(&args),
        Commands::Classify(args) => cli.classify_output(args).await,
        Commands::History { command } => cli.handle_history_command(command).await,
        Commands::Serve => {
            info!("Starting Runbook MCP server");
            let history = cli.history().await?;
            run_stdio_server(RunbookMcpServer::new(history))
                .await
                .context("MCP server failed")
        }
    }
}
