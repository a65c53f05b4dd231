//! Captured result of a single command invocation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported for commands killed by their timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code used for synthetic outcomes of a broken transport.
pub const TRANSPORT_EXIT_CODE: i32 = -1;

/// What a command produced: streams, exit code and elapsed time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    /// stdout followed by stderr, the text criteria and triggers look at
    pub combined: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn new(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
        duration: Duration,
    ) -> Self {
        let stdout = stdout.into();
        let stderr = stderr.into();
        let combined = combine(&stdout, &stderr);
        Self {
            stdout,
            stderr,
            combined,
            exit_code,
            duration_ms: duration.as_millis() as u64,
            timed_out: false,
        }
    }

    /// Outcome of a command that hit its timeout. Carries a "timed out"
    /// marker in stderr so the classifier sees it.
    pub fn timed_out(stdout: impl Into<String>, timeout: Duration) -> Self {
        let mut outcome = Self::new(
            stdout,
            format!("command timed out after {}s", timeout.as_secs()),
            TIMEOUT_EXIT_CODE,
            timeout,
        );
        outcome.timed_out = true;
        outcome
    }

    /// Synthetic outcome standing in for a transport failure.
    pub fn transport_failure(message: &str) -> Self {
        Self::new(
            "",
            format!("connection failed: {message}"),
            TRANSPORT_EXIT_CODE,
            Duration::ZERO,
        )
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) if stdout.ends_with('\n') => format!("{stdout}{stderr}"),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
