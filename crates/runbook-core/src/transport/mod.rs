//! Command execution and filesystem probing capabilities.
//!
//! The engine never spawns processes itself. It drives a [`CommandExecutor`]
//! and, for filesystem criteria, a [`FilesystemProbe`]. [`ShellExecutor`]
//! covers local shells and `ssh` targets; tests substitute scripted
//! executors.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::{
    error::Result,
    models::{CommandOutcome, PathKind},
};

mod probe;
mod shell;

pub use probe::{CommandProbe, LocalFilesystem};
pub use shell::ShellExecutor;

/// One command to run on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Full shell command line, pre-commands included
    pub command: String,
    /// Variables exported before the command runs
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
            timeout,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// The command prefixed with `export` statements for its environment,
    /// for transports that cannot set variables on the remote process.
    pub fn exported_command(&self) -> String {
        if self.env.is_empty() {
            return self.command.clone();
        }
        let exports = self
            .env
            .iter()
            .map(|(k, v)| format!("export {k}={};", crate::recovery::shell_quote(v)))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{exports} {}", self.command)
    }
}

/// Runs shell commands on a target.
///
/// A non-zero exit code or a timeout is a normal [`CommandOutcome`]. Only an
/// unusable channel is an error, reported as
/// [`crate::RunbookError::Transport`].
pub trait CommandExecutor: Send + Sync {
    fn run(&self, request: &CommandRequest) -> impl Future<Output = Result<CommandOutcome>> + Send;
}

/// Answers whether a path exists on the target.
pub trait FilesystemProbe: Send + Sync {
    fn exists(&self, path: &str, kind: PathKind) -> impl Future<Output = Result<bool>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exported_command() {
        let mut env = BTreeMap::new();
        env.insert("B".to_string(), "two words".to_string());
        env.insert("A".to_string(), "1".to_string());
        let request = CommandRequest::new("echo $A", Duration::from_secs(1)).with_env(env);
        assert_eq!(
            request.exported_command(),
            "export A='1'; export B='two words'; echo $A"
        );

        let bare = CommandRequest::new("uptime", Duration::from_secs(1));
        assert_eq!(bare.exported_command(), "uptime");
    }
}
