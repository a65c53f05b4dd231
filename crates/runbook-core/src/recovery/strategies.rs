//! Static recovery strategy catalog and command synthesis.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ErrorPattern;
use crate::models::CommandOutcome;

/// Pause before reissuing a command with [`RecoveryStrategy::WaitAndRetry`].
pub const WAIT_AND_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Pause before reissuing a command with [`RecoveryStrategy::RetryConnection`].
pub const RETRY_CONNECTION_DELAY: Duration = Duration::from_secs(3);

/// Removes this user's day-old `runbook-*` files from the temp directory.
/// Only regular files at the top level are touched.
pub const CLEANUP_SPACE_COMMAND: &str = "find \"${TMPDIR:-/tmp}\" -maxdepth 1 -type f -user \"$(id -un)\" -name 'runbook-*' -mtime +1 -delete 2>/dev/null";

/// One of a fixed catalog of remediation actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryStrategy {
    CommandAlternatives,
    PathDiscovery,
    PackageInstallation,
    ElevatePrivileges,
    ChangePermissions,
    CreateDirectory,
    AlternativePath,
    IncreaseTimeout,
    WaitAndRetry,
    RetryConnection,
    CleanupSpace,
    UseExisting,
    SimplifyArguments,
}

/// Catalog order per error pattern. Static, never learned at runtime.
pub fn strategies_for(pattern: ErrorPattern) -> &'static [RecoveryStrategy] {
    use RecoveryStrategy as S;

    match pattern {
        ErrorPattern::CommandNotFound => &[
            S::CommandAlternatives,
            S::PathDiscovery,
            S::PackageInstallation,
        ],
        ErrorPattern::PermissionDenied => &[S::ElevatePrivileges, S::ChangePermissions],
        ErrorPattern::FileNotFound => &[S::CreateDirectory, S::AlternativePath],
        ErrorPattern::Timeout => &[S::IncreaseTimeout, S::WaitAndRetry],
        ErrorPattern::ConnectionFailed => &[S::RetryConnection, S::WaitAndRetry],
        ErrorPattern::InsufficientSpace => &[S::CleanupSpace],
        ErrorPattern::AlreadyExists => &[S::UseExisting],
        ErrorPattern::InvalidArgument => &[S::SimplifyArguments],
        ErrorPattern::ResourceBusy => &[S::WaitAndRetry],
    }
}

/// What a strategy knows about the failure it is trying to fix.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext<'a> {
    /// The step command as declared, without pre-commands
    pub command: &'a str,
    pub outcome: &'a CommandOutcome,
    pub step_timeout: Duration,
}

/// A concrete command synthesized by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAction {
    pub command: String,
    pub timeout: Duration,
    /// Pause before running the command
    pub delay: Duration,
}

impl RecoveryAction {
    fn run(command: String, ctx: &RecoveryContext<'_>) -> Self {
        Self {
            command,
            timeout: ctx.step_timeout,
            delay: Duration::ZERO,
        }
    }
}

impl RecoveryStrategy {
    pub const ALL: [RecoveryStrategy; 13] = [
        RecoveryStrategy::CommandAlternatives,
        RecoveryStrategy::PathDiscovery,
        RecoveryStrategy::PackageInstallation,
        RecoveryStrategy::ElevatePrivileges,
        RecoveryStrategy::ChangePermissions,
        RecoveryStrategy::CreateDirectory,
        RecoveryStrategy::AlternativePath,
        RecoveryStrategy::IncreaseTimeout,
        RecoveryStrategy::WaitAndRetry,
        RecoveryStrategy::RetryConnection,
        RecoveryStrategy::CleanupSpace,
        RecoveryStrategy::UseExisting,
        RecoveryStrategy::SimplifyArguments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::CommandAlternatives => "commandAlternatives",
            RecoveryStrategy::PathDiscovery => "pathDiscovery",
            RecoveryStrategy::PackageInstallation => "packageInstallation",
            RecoveryStrategy::ElevatePrivileges => "elevatePrivileges",
            RecoveryStrategy::ChangePermissions => "changePermissions",
            RecoveryStrategy::CreateDirectory => "createDirectory",
            RecoveryStrategy::AlternativePath => "alternativePath",
            RecoveryStrategy::IncreaseTimeout => "increaseTimeout",
            RecoveryStrategy::WaitAndRetry => "waitAndRetry",
            RecoveryStrategy::RetryConnection => "retryConnection",
            RecoveryStrategy::CleanupSpace => "cleanupSpace",
            RecoveryStrategy::UseExisting => "useExisting",
            RecoveryStrategy::SimplifyArguments => "simplifyArguments",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RecoveryStrategy::CommandAlternatives => "Try an equivalent command",
            RecoveryStrategy::PathDiscovery => "Search common binary directories",
            RecoveryStrategy::PackageInstallation => "Install the missing package",
            RecoveryStrategy::ElevatePrivileges => "Run with sudo",
            RecoveryStrategy::ChangePermissions => "Grant the owner access to the path",
            RecoveryStrategy::CreateDirectory => "Create the missing directory",
            RecoveryStrategy::AlternativePath => "Resolve the path under the home directory",
            RecoveryStrategy::IncreaseTimeout => "Rerun with a longer timeout",
            RecoveryStrategy::WaitAndRetry => "Wait and rerun",
            RecoveryStrategy::RetryConnection => "Reconnect and rerun",
            RecoveryStrategy::CleanupSpace => "Remove stale runbook temporary files",
            RecoveryStrategy::UseExisting => "Reuse the existing target",
            RecoveryStrategy::SimplifyArguments => "Drop unsupported options",
        }
    }

    /// Whether the strategy may be used when the transport itself failed.
    pub fn survives_transport_failure(&self) -> bool {
        matches!(
            self,
            RecoveryStrategy::RetryConnection | RecoveryStrategy::WaitAndRetry
        )
    }

    /// Derives a concrete command, or `None` when the available output does
    /// not allow one. `None` means the strategy is skipped.
    pub fn synthesize(&self, ctx: &RecoveryContext<'_>) -> Option<RecoveryAction> {
        let command = ctx.command.trim();
        if command.is_empty() {
            return None;
        }

        match self {
            RecoveryStrategy::CommandAlternatives => {
                command_alternative(command).map(|c| RecoveryAction::run(c, ctx))
            }
            RecoveryStrategy::PathDiscovery => Some(RecoveryAction::run(
                format!("export PATH=\"$PATH:{EXTRA_PATH}\" && {command}"),
                ctx,
            )),
            RecoveryStrategy::PackageInstallation => {
                let program = program_name(command)?;
                let package = package_for(program);
                Some(RecoveryAction {
                    command: format!("({}) && {command}", install_chain(package)),
                    timeout: ctx.step_timeout.saturating_mul(4),
                    delay: Duration::ZERO,
                })
            }
            RecoveryStrategy::ElevatePrivileges => {
                if command.starts_with("sudo ") {
                    return None;
                }
                let elevated = if has_shell_syntax(command) {
                    format!("sudo -n sh -c {}", shell_quote(command))
                } else {
                    format!("sudo -n {command}")
                };
                Some(RecoveryAction::run(elevated, ctx))
            }
            RecoveryStrategy::ChangePermissions => {
                let path = extract_path(&ctx.outcome.combined)?;
                Some(RecoveryAction::run(
                    format!("chmod u+rwX {} && {command}", shell_quote(&path)),
                    ctx,
                ))
            }
            RecoveryStrategy::CreateDirectory => {
                let path = extract_path(&ctx.outcome.combined)?;
                let directory = directory_for(&path)?;
                Some(RecoveryAction::run(
                    format!("mkdir -p {} && {command}", shell_quote(&directory)),
                    ctx,
                ))
            }
            RecoveryStrategy::AlternativePath => {
                let path = extract_path(&ctx.outcome.combined)?;
                let replacement = if let Some(rest) = path.strip_prefix("~/") {
                    format!("\"$HOME/{rest}\"")
                } else if !path.starts_with('/') && !path.starts_with('$') {
                    format!("\"$HOME/{}\"", path.trim_start_matches("./"))
                } else {
                    return None;
                };
                if !command.contains(&path) {
                    return None;
                }
                Some(RecoveryAction::run(command.replace(&path, &replacement), ctx))
            }
            RecoveryStrategy::IncreaseTimeout => Some(RecoveryAction {
                command: command.to_string(),
                timeout: ctx.step_timeout.saturating_mul(2),
                delay: Duration::ZERO,
            }),
            RecoveryStrategy::WaitAndRetry => Some(RecoveryAction {
                command: command.to_string(),
                timeout: ctx.step_timeout,
                delay: WAIT_AND_RETRY_DELAY,
            }),
            RecoveryStrategy::RetryConnection => Some(RecoveryAction {
                command: command.to_string(),
                timeout: ctx.step_timeout,
                delay: RETRY_CONNECTION_DELAY,
            }),
            RecoveryStrategy::CleanupSpace => Some(RecoveryAction::run(
                format!("{CLEANUP_SPACE_COMMAND}; {command}"),
                ctx,
            )),
            RecoveryStrategy::UseExisting => idempotent_form(command).map(|c| RecoveryAction::run(c, ctx)),
            RecoveryStrategy::SimplifyArguments => {
                simplified_arguments(command).map(|c| RecoveryAction::run(c, ctx))
            }
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecoveryStrategy::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Invalid recovery strategy: {s}"))
    }
}

const EXTRA_PATH: &str =
    "/usr/local/bin:/usr/local/sbin:/opt/homebrew/bin:/usr/sbin:/sbin:$HOME/.local/bin:$HOME/bin";

/// Known command synonyms: (program, replacement, keep arguments).
const SYNONYMS: &[(&str, &str, bool)] = &[
    ("python", "python3", true),
    ("pip", "pip3", true),
    ("free", "vm_stat", false),
    ("vm_stat", "free -h", false),
    ("ifconfig", "ip addr", false),
    ("netstat", "ss", true),
    ("service", "systemctl", true),
    ("nslookup", "host", true),
    ("md5sum", "md5", true),
    ("md5", "md5sum", true),
    ("sha256sum", "shasum -a 256", true),
    ("shasum", "sha256sum", false),
    ("vim", "vi", true),
];

/// Packages providing commands whose package name differs.
const PACKAGES: &[(&str, &str)] = &[
    ("ifconfig", "net-tools"),
    ("netstat", "net-tools"),
    ("dig", "dnsutils"),
    ("nslookup", "dnsutils"),
    ("free", "procps"),
    ("ip", "iproute2"),
    ("ss", "iproute2"),
    ("python", "python3"),
    ("pip", "python3-pip"),
    ("pip3", "python3-pip"),
];

static QUOTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"‘`]((?:/|~/|\./|\.\./)[^'"’`\n]+|[^'"’`\s/]+/[^'"’`\n]*)['"’`]"#)
        .expect("static regex")
});

static BARE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])((?:/|~/|\./|\.\./)[^\s:'\x22,;()]+|[\w.\-]+/[^\s:'\x22,;()]+)")
        .expect("static regex")
});

/// Extracts the first path-looking fragment from command output, preferring
/// quoted ones.
pub fn extract_path(output: &str) -> Option<String> {
    QUOTED_PATH
        .captures(output)
        .or_else(|| BARE_PATH.captures(output))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|p| !p.is_empty())
}

/// The directory to create for a missing path: the parent when the last
/// component looks like a file name.
fn directory_for(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let (parent, last) = match trimmed.rsplit_once('/') {
        Some((parent, last)) => (parent, last),
        None => ("", trimmed),
    };
    if last.contains('.') && !last.starts_with('.') {
        (!parent.is_empty()).then(|| parent.to_string())
    } else {
        Some(trimmed.to_string()).filter(|p| !p.is_empty())
    }
}

fn program_name(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|token| !token.contains('='))
        .filter(|token| *token != "sudo")
}

fn package_for(program: &str) -> &str {
    PACKAGES
        .iter()
        .find(|(name, _)| *name == program)
        .map_or(program, |(_, package)| *package)
}

fn install_chain(package: &str) -> String {
    [
        ("apt-get", format!("sudo -n apt-get install -y {package}")),
        ("dnf", format!("sudo -n dnf install -y {package}")),
        ("yum", format!("sudo -n yum install -y {package}")),
        ("apk", format!("sudo -n apk add {package}")),
        ("brew", format!("brew install {package}")),
    ]
    .iter()
    .map(|(manager, install)| format!("(command -v {manager} >/dev/null 2>&1 && {install})"))
    .collect::<Vec<_>>()
    .join(" || ")
}

fn command_alternative(command: &str) -> Option<String> {
    let program = program_name(command)?;
    if let Some((_, replacement, keep_args)) = SYNONYMS.iter().find(|(name, _, _)| *name == program)
    {
        if !keep_args {
            return Some((*replacement).to_string());
        }
        return Some(command.replacen(program, replacement, 1));
    }
    // Non-interactive sessions often miss the PATH and aliases of the login
    // profile.
    if command.starts_with("bash -lc ") {
        return None;
    }
    Some(format!("bash -lc {}", shell_quote(command)))
}

fn idempotent_form(command: &str) -> Option<String> {
    let mut tokens = command.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some("mkdir"), Some(second)) if second != "-p" => {
            Some(command.replacen("mkdir", "mkdir -p", 1))
        }
        (Some("ln"), Some("-s")) => Some(command.replacen("ln -s", "ln -sfn", 1)),
        (Some("cp"), Some(second)) if !second.starts_with('-') => {
            Some(command.replacen("cp", "cp -f", 1))
        }
        _ => None,
    }
}

fn simplified_arguments(command: &str) -> Option<String> {
    if has_shell_syntax(command) {
        return None;
    }
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let kept: Vec<&str> = tokens
        .iter()
        .enumerate()
        .filter(|(i, t)| *i == 0 || !t.starts_with('-'))
        .map(|(_, t)| *t)
        .collect();
    (kept.len() < tokens.len()).then(|| kept.join(" "))
}

fn has_shell_syntax(command: &str) -> bool {
    command.contains(['|', '&', ';', '>', '<', '$', '`', '(', ')'])
}

/// Wraps a string in single quotes for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(command: &'a str, outcome: &'a CommandOutcome) -> RecoveryContext<'a> {
        RecoveryContext {
            command,
            outcome,
            step_timeout: Duration::from_secs(10),
        }
    }

    fn failure(stderr: &str) -> CommandOutcome {
        CommandOutcome::new("", stderr, 1, Duration::ZERO)
    }

    #[test]
    fn test_command_not_found_catalog_order() {
        assert_eq!(
            strategies_for(ErrorPattern::CommandNotFound),
            &[
                RecoveryStrategy::CommandAlternatives,
                RecoveryStrategy::PathDiscovery,
                RecoveryStrategy::PackageInstallation
            ]
        );
    }

    #[test]
    fn test_every_pattern_has_strategies() {
        for pattern in ErrorPattern::ALL {
            assert!(!strategies_for(pattern).is_empty(), "{pattern}");
        }
    }

    #[test]
    fn test_command_alternatives_synonym() {
        let outcome = failure("bash: python: command not found");
        let action = RecoveryStrategy::CommandAlternatives
            .synthesize(&ctx("python --version", &outcome))
            .unwrap();
        assert_eq!(action.command, "python3 --version");

        let action = RecoveryStrategy::CommandAlternatives
            .synthesize(&ctx("free -h", &outcome))
            .unwrap();
        assert_eq!(action.command, "vm_stat");
    }

    #[test]
    fn test_command_alternatives_login_shell_for_unknown() {
        let outcome = failure("bash: foobar: command not found");
        let action = RecoveryStrategy::CommandAlternatives
            .synthesize(&ctx("foobar", &outcome))
            .unwrap();
        assert_eq!(action.command, "bash -lc 'foobar'");

        assert!(RecoveryStrategy::CommandAlternatives
            .synthesize(&ctx("bash -lc 'foobar'", &outcome))
            .is_none());
    }

    #[test]
    fn test_create_directory_from_missing_path() {
        let outcome = failure("touch: cannot touch '/var/log/app/out.log': No such file or directory");
        let action = RecoveryStrategy::CreateDirectory
            .synthesize(&ctx("touch /var/log/app/out.log", &outcome))
            .unwrap();
        assert_eq!(
            action.command,
            "mkdir -p '/var/log/app' && touch /var/log/app/out.log"
        );

        let outcome = failure("bash: cd: /srv/data: No such file or directory");
        let action = RecoveryStrategy::CreateDirectory
            .synthesize(&ctx("cd /srv/data", &outcome))
            .unwrap();
        assert_eq!(action.command, "mkdir -p '/srv/data' && cd /srv/data");
    }

    #[test]
    fn test_strategy_without_path_is_skipped() {
        let outcome = failure("No such file or directory");
        assert!(RecoveryStrategy::CreateDirectory
            .synthesize(&ctx("run-it", &outcome))
            .is_none());
        assert!(RecoveryStrategy::ChangePermissions
            .synthesize(&ctx("run-it", &outcome))
            .is_none());
    }

    #[test]
    fn test_elevate_privileges() {
        let outcome = failure("Permission denied");
        let action = RecoveryStrategy::ElevatePrivileges
            .synthesize(&ctx("cat /etc/shadow", &outcome))
            .unwrap();
        assert_eq!(action.command, "sudo -n cat /etc/shadow");

        let action = RecoveryStrategy::ElevatePrivileges
            .synthesize(&ctx("echo x > /etc/motd", &outcome))
            .unwrap();
        assert_eq!(action.command, "sudo -n sh -c 'echo x > /etc/motd'");

        assert!(RecoveryStrategy::ElevatePrivileges
            .synthesize(&ctx("sudo reboot", &outcome))
            .is_none());
    }

    #[test]
    fn test_increase_timeout_doubles() {
        let outcome = CommandOutcome::timed_out("", Duration::from_secs(10));
        let action = RecoveryStrategy::IncreaseTimeout
            .synthesize(&ctx("make", &outcome))
            .unwrap();
        assert_eq!(action.command, "make");
        assert_eq!(action.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_wait_and_retry_delays() {
        let outcome = failure("Device or resource busy");
        let action = RecoveryStrategy::WaitAndRetry
            .synthesize(&ctx("umount /mnt", &outcome))
            .unwrap();
        assert_eq!(action.delay, WAIT_AND_RETRY_DELAY);
        assert_eq!(action.command, "umount /mnt");
    }

    #[test]
    fn test_cleanup_space_is_scoped_and_non_recursive() {
        let outcome = failure("write error: No space left on device");
        let action = RecoveryStrategy::CleanupSpace
            .synthesize(&ctx("tar xf dump.tar", &outcome))
            .unwrap();
        assert_eq!(action.command, format!("{CLEANUP_SPACE_COMMAND}; tar xf dump.tar"));
        assert!(action.command.contains("-name 'runbook-*'"));
        assert!(action.command.contains("-type f"));
        assert!(!action.command.contains("rm -rf"));
    }

    #[test]
    fn test_use_existing_and_simplify() {
        let outcome = failure("mkdir: /tmp/x: File exists");
        let action = RecoveryStrategy::UseExisting
            .synthesize(&ctx("mkdir /tmp/x", &outcome))
            .unwrap();
        assert_eq!(action.command, "mkdir -p /tmp/x");

        let outcome = failure("ls: unrecognized option '--fancy'");
        let action = RecoveryStrategy::SimplifyArguments
            .synthesize(&ctx("ls --fancy /tmp", &outcome))
            .unwrap();
        assert_eq!(action.command, "ls /tmp");
        assert!(RecoveryStrategy::SimplifyArguments
            .synthesize(&ctx("ls /tmp", &outcome))
            .is_none());
    }

    #[test]
    fn test_alternative_path_for_relative_paths() {
        let outcome = failure("cat: config/app.yml: No such file or directory");
        let action = RecoveryStrategy::AlternativePath
            .synthesize(&ctx("cat config/app.yml", &outcome))
            .unwrap();
        assert_eq!(action.command, "cat \"$HOME/config/app.yml\"");
    }

    #[test]
    fn test_extract_path() {
        assert_eq!(
            extract_path("cat: /etc/app/config.yml: No such file or directory").as_deref(),
            Some("/etc/app/config.yml")
        );
        assert_eq!(
            extract_path("cannot access 'data/out.txt': No such file").as_deref(),
            Some("data/out.txt")
        );
        assert_eq!(extract_path("nothing to see"), None);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&RecoveryStrategy::CommandAlternatives).unwrap();
        assert_eq!(json, "\"commandAlternatives\"");
        assert_eq!(
            "waitandretry".parse::<RecoveryStrategy>(),
            Ok(RecoveryStrategy::WaitAndRetry)
        );
    }
}
