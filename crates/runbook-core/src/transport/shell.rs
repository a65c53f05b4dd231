use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use log::debug;
use tokio::process::Command;

use super::{CommandExecutor, CommandRequest};
use crate::{
    error::{Result, RunbookError},
    models::CommandOutcome,
};

/// Exit code `ssh` reserves for its own failures.
const SSH_ERROR_EXIT_CODE: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Local { shell: String },
    Ssh { destination: String, options: Vec<String> },
}

/// Runs commands through a local shell or over `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellExecutor {
    target: Target,
}

impl ShellExecutor {
    /// Runs commands with `sh -c` on this machine.
    pub fn local() -> Self {
        Self {
            target: Target::Local {
                shell: "sh".to_string(),
            },
        }
    }

    /// Runs commands on `destination` (`user@host` or an ssh config alias)
    /// with the system `ssh` client in batch mode.
    pub fn ssh(destination: impl Into<String>) -> Self {
        Self {
            target: Target::Ssh {
                destination: destination.into(),
                options: vec![
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-o".to_string(),
                    "ConnectTimeout=10".to_string(),
                ],
            },
        }
    }

    /// Adds an `ssh -o` option such as `Port=2222`. Ignored for local
    /// targets.
    pub fn with_ssh_option(mut self, option: impl Into<String>) -> Self {
        if let Target::Ssh { options, .. } = &mut self.target {
            options.push("-o".to_string());
            options.push(option.into());
        }
        self
    }

    /// Human readable name of the target.
    pub fn describe(&self) -> String {
        match &self.target {
            Target::Local { .. } => "localhost".to_string(),
            Target::Ssh { destination, .. } => destination.clone(),
        }
    }

    fn command(&self, request: &CommandRequest) -> Command {
        match &self.target {
            Target::Local { shell } => {
                let mut command = Command::new(shell);
                command.arg("-c").arg(&request.command).envs(&request.env);
                command
            }
            Target::Ssh {
                destination,
                options,
            } => {
                let mut command = Command::new("ssh");
                command
                    .args(options)
                    .arg(destination)
                    .arg("--")
                    .arg(request.exported_command());
                command
            }
        }
    }
}

impl CommandExecutor for ShellExecutor {
    async fn run(&self, request: &CommandRequest) -> Result<CommandOutcome> {
        debug!("Running on {}: {}", self.describe(), request.command);

        let mut command = self.command(request);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            RunbookError::transport(format!("failed to start {}: {e}", self.describe()))
        })?;

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                RunbookError::transport(format!("lost connection to {}: {e}", self.describe()))
            })?,
            // The child is dropped with the future and killed.
            Err(_) => return Ok(CommandOutcome::timed_out("", request.timeout)),
        };

        let exit_code = exit_code(output.status);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if matches!(self.target, Target::Ssh { .. }) && exit_code == SSH_ERROR_EXIT_CODE {
            return Err(RunbookError::transport(format!(
                "ssh to {} failed: {}",
                self.describe(),
                stderr.trim()
            )));
        }

        Ok(CommandOutcome::new(stdout, stderr, exit_code, started.elapsed()))
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_local_captures_streams_and_exit_code() {
        let request = CommandRequest::new("echo out; echo err >&2; exit 3", Duration::from_secs(5));
        let outcome = ShellExecutor::local().run(&request).await.unwrap();
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.combined, "out\nerr\n");
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_local_environment() {
        let mut env = BTreeMap::new();
        env.insert("RUNBOOK_GREETING".to_string(), "hello".to_string());
        let request =
            CommandRequest::new("echo $RUNBOOK_GREETING", Duration::from_secs(5)).with_env(env);
        let outcome = ShellExecutor::local().run(&request).await.unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_timeout_is_an_outcome() {
        let request = CommandRequest::new("sleep 5", Duration::from_millis(100));
        let outcome = ShellExecutor::local().run(&request).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, crate::models::outcome::TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn test_describe() {
        assert_eq!(ShellExecutor::local().describe(), "localhost");
        assert_eq!(ShellExecutor::ssh("ops@db1").describe(), "ops@db1");
    }

    #[test]
    fn test_ssh_options_precede_destination() {
        let executor = ShellExecutor::ssh("ops@db1")
            .with_ssh_option("Port=2222")
            .with_ssh_option("User=deploy");
        let request = CommandRequest::new("uptime", Duration::from_secs(5));
        let command = executor.command(&request);
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            &args[..9],
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "Port=2222",
                "-o",
                "User=deploy",
                "ops@db1"
            ]
        );
        assert_eq!(args[9], "--");
    }

    #[test]
    fn test_ssh_option_ignored_locally() {
        assert_eq!(
            ShellExecutor::local().with_ssh_option("Port=2222"),
            ShellExecutor::local()
        );
    }
}
