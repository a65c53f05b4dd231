#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runbook_core::{
    models::PathKind, CommandExecutor, CommandOutcome, CommandRequest, FilesystemProbe, History,
    HistoryBuilder, Result, RunbookError,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A scripted reply of the mock executor.
#[derive(Debug, Clone)]
pub enum Reply {
    Outcome(CommandOutcome),
    TransportError(String),
}

pub fn ok(stdout: &str, millis: u64) -> Reply {
    Reply::Outcome(CommandOutcome::new(
        stdout,
        "",
        0,
        Duration::from_millis(millis),
    ))
}

pub fn fail(stderr: &str, exit_code: i32, millis: u64) -> Reply {
    Reply::Outcome(CommandOutcome::new(
        "",
        stderr,
        exit_code,
        Duration::from_millis(millis),
    ))
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<CommandRequest>,
    cancel_on: Vec<(String, CancellationToken)>,
}

/// Executor answering from a script keyed by the exact command line.
///
/// Replies for a command are consumed in order and the last one repeats.
/// Unscripted commands fail like a shell that cannot find them.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    script: Arc<Mutex<Script>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, command: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Cancels `token` while `command` is running, as an operator pressing
    /// Ctrl-C mid-step would.
    pub fn cancel_on(self, command: &str, token: CancellationToken) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .cancel_on
            .push((command.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script
            .lock()
            .expect("script lock")
            .calls
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.script.lock().expect("script lock").calls.clone()
    }
}

impl CommandExecutor for MockExecutor {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutcome> {
        let reply = {
            let mut script = self.script.lock().expect("script lock");
            script.calls.push(request.clone());
            for (command, token) in &script.cancel_on {
                if *command == request.command {
                    token.cancel();
                }
            }
            match script.replies.get_mut(&request.command) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Outcome(outcome)) => Ok(outcome),
            Some(Reply::TransportError(message)) => Err(RunbookError::transport(message)),
            None => Ok(CommandOutcome::new(
                "",
                format!("sh: 1: {}: command not found", request.command),
                127,
                Duration::from_millis(5),
            )),
        }
    }
}

/// Probe answering from a fixed set of existing paths.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    existing: Vec<(String, PathKind)>,
}

impl StaticProbe {
    pub fn with(mut self, path: &str, kind: PathKind) -> Self {
        self.existing.push((path.to_string(), kind));
        self
    }
}

impl FilesystemProbe for StaticProbe {
    async fn exists(&self, path: &str, kind: PathKind) -> Result<bool> {
        Ok(self.existing.iter().any(|(p, k)| p == path && *k == kind))
    }
}

/// Helper function to create a history store in a temporary directory
pub async fn create_test_history() -> (TempDir, History) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("history.db");
    let history = HistoryBuilder::new()
        .with_database_path(Some(&db_path))
        .build()
        .await
        .expect("Failed to create history");
    (temp_dir, history)
}
