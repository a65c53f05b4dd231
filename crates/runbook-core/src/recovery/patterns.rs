//! Error pattern classification of raw command output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::outcome::{CommandOutcome, TIMEOUT_EXIT_CODE};

/// A recognized category of command failure.
///
/// Declaration order is the classifier order: the first detected pattern is
/// the primary one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorPattern {
    CommandNotFound,
    PermissionDenied,
    FileNotFound,
    Timeout,
    ConnectionFailed,
    InsufficientSpace,
    AlreadyExists,
    InvalidArgument,
    ResourceBusy,
}

impl ErrorPattern {
    pub const ALL: [ErrorPattern; 9] = [
        ErrorPattern::CommandNotFound,
        ErrorPattern::PermissionDenied,
        ErrorPattern::FileNotFound,
        ErrorPattern::Timeout,
        ErrorPattern::ConnectionFailed,
        ErrorPattern::InsufficientSpace,
        ErrorPattern::AlreadyExists,
        ErrorPattern::InvalidArgument,
        ErrorPattern::ResourceBusy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPattern::CommandNotFound => "commandNotFound",
            ErrorPattern::PermissionDenied => "permissionDenied",
            ErrorPattern::FileNotFound => "fileNotFound",
            ErrorPattern::Timeout => "timeout",
            ErrorPattern::ConnectionFailed => "connectionFailed",
            ErrorPattern::InsufficientSpace => "insufficientSpace",
            ErrorPattern::AlreadyExists => "alreadyExists",
            ErrorPattern::InvalidArgument => "invalidArgument",
            ErrorPattern::ResourceBusy => "resourceBusy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorPattern::CommandNotFound => "Command is not installed or not on PATH",
            ErrorPattern::PermissionDenied => "Insufficient permissions",
            ErrorPattern::FileNotFound => "File or directory does not exist",
            ErrorPattern::Timeout => "Operation timed out",
            ErrorPattern::ConnectionFailed => "Network connection failed",
            ErrorPattern::InsufficientSpace => "No space left on device",
            ErrorPattern::AlreadyExists => "Target already exists",
            ErrorPattern::InvalidArgument => "Invalid argument or option",
            ErrorPattern::ResourceBusy => "Resource is busy or locked",
        }
    }

    /// Lowercase fragments whose presence in the output signals the pattern.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            ErrorPattern::CommandNotFound => &[
                "command not found",
                "not found in path",
                "no such command",
                "is not recognized as",
                "unknown command",
            ],
            ErrorPattern::PermissionDenied => &[
                "permission denied",
                "operation not permitted",
                "access denied",
                "must be run as root",
                "are you root",
            ],
            ErrorPattern::FileNotFound => &[
                "no such file",
                "cannot find",
                "does not exist",
                "not a directory",
            ],
            ErrorPattern::Timeout => &["timed out", "timeout", "time out"],
            ErrorPattern::ConnectionFailed => &[
                "connection refused",
                "connection reset",
                "connection failed",
                "connection closed",
                "could not resolve host",
                "network is unreachable",
                "no route to host",
                "broken pipe",
            ],
            ErrorPattern::InsufficientSpace => &[
                "no space left",
                "disk quota exceeded",
                "not enough space",
                "disk full",
            ],
            ErrorPattern::AlreadyExists => &["already exists", "file exists"],
            ErrorPattern::InvalidArgument => &[
                "invalid argument",
                "invalid option",
                "unrecognized option",
                "illegal option",
                "unknown option",
                "usage:",
            ],
            ErrorPattern::ResourceBusy => &[
                "device or resource busy",
                "resource busy",
                "text file busy",
                "resource temporarily unavailable",
                "could not get lock",
            ],
        }
    }

    fn matches_exit_code(&self, outcome: &CommandOutcome) -> bool {
        match self {
            ErrorPattern::CommandNotFound => outcome.exit_code == 127,
            ErrorPattern::PermissionDenied => outcome.exit_code == 126,
            ErrorPattern::Timeout => outcome.timed_out || outcome.exit_code == TIMEOUT_EXIT_CODE,
            _ => false,
        }
    }

    fn detect(&self, lowered: &str, outcome: &CommandOutcome) -> bool {
        self.matches_exit_code(outcome) || self.keywords().iter().any(|k| lowered.contains(k))
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorPattern::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid error pattern: {s}"))
    }
}

/// Returns every pattern detected in the outcome, in classifier order.
///
/// A successful command (exit code 0, not timed out) is still scanned: output
/// such as `rm: cannot remove 'x': Permission denied` with a zero exit code
/// is reported. Unmatched output yields an empty list.
pub fn classify(outcome: &CommandOutcome) -> Vec<ErrorPattern> {
    let lowered = outcome.combined.to_lowercase();
    ErrorPattern::ALL
        .into_iter()
        .filter(|p| p.detect(&lowered, outcome))
        .collect()
}

/// The first detected pattern, if any.
pub fn primary(outcome: &CommandOutcome) -> Option<ErrorPattern> {
    let lowered = outcome.combined.to_lowercase();
    ErrorPattern::ALL
        .into_iter()
        .find(|p| p.detect(&lowered, outcome))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn failed(stderr: &str, exit_code: i32) -> CommandOutcome {
        CommandOutcome::new("", stderr, exit_code, Duration::from_millis(3))
    }

    #[test]
    fn test_command_not_found() {
        let outcome = failed("bash: foobar: command not found", 127);
        assert_eq!(classify(&outcome), vec![ErrorPattern::CommandNotFound]);
        assert_eq!(primary(&outcome), Some(ErrorPattern::CommandNotFound));
    }

    #[test]
    fn test_exit_code_only_detection() {
        assert_eq!(
            classify(&failed("", 127)),
            vec![ErrorPattern::CommandNotFound]
        );
        assert_eq!(
            classify(&failed("", 126)),
            vec![ErrorPattern::PermissionDenied]
        );
    }

    #[test]
    fn test_case_insensitive_and_multiple() {
        let outcome = failed(
            "mkdir: cannot create directory '/opt/app': Permission Denied\nNo space left on device",
            1,
        );
        assert_eq!(
            classify(&outcome),
            vec![
                ErrorPattern::PermissionDenied,
                ErrorPattern::InsufficientSpace
            ]
        );
        assert_eq!(primary(&outcome), Some(ErrorPattern::PermissionDenied));
    }

    #[test]
    fn test_timeout_flag() {
        let outcome = CommandOutcome::timed_out("", Duration::from_secs(1));
        assert!(classify(&outcome).contains(&ErrorPattern::Timeout));
    }

    #[test]
    fn test_transport_failure_is_connection_failed() {
        let outcome = CommandOutcome::transport_failure("channel closed");
        assert_eq!(primary(&outcome), Some(ErrorPattern::ConnectionFailed));
    }

    #[test]
    fn test_unmatched_output_is_empty() {
        let outcome = failed("something odd happened", 3);
        assert!(classify(&outcome).is_empty());
        assert_eq!(primary(&outcome), None);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let outcome = failed("ln: failed to create symbolic link 'x': File exists", 1);
        assert_eq!(classify(&outcome), classify(&outcome));
        assert_eq!(classify(&outcome), vec![ErrorPattern::AlreadyExists]);
    }

    #[test]
    fn test_pattern_from_str() {
        assert_eq!(
            "commandnotfound".parse::<ErrorPattern>(),
            Ok(ErrorPattern::CommandNotFound)
        );
        assert!("bogus".parse::<ErrorPattern>().is_err());
    }
}
