//! Success and failure criteria.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunbookError;

/// A named, typed predicate evaluated against a command outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Criterion {
    /// Human readable description shown in results
    pub description: String,

    /// What is checked
    pub check: CriterionKind,
}

impl Criterion {
    pub fn new(description: impl Into<String>, check: CriterionKind) -> Self {
        Self {
            description: description.into(),
            check,
        }
    }

    pub fn contains_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(
            format!("output contains '{text}'"),
            CriterionKind::ContainsText(text),
        )
    }

    pub fn not_contains_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(
            format!("output does not contain '{text}'"),
            CriterionKind::NotContainsText(text),
        )
    }

    pub fn exit_code(code: i32) -> Self {
        Self::new(format!("exit code is {code}"), CriterionKind::ExitCode(code))
    }

    pub fn command_succeeded() -> Self {
        Self::new("command succeeded", CriterionKind::CommandSucceeded)
    }

    pub fn regex_match(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::new(
            format!("output matches /{pattern}/"),
            CriterionKind::RegexMatch(pattern),
        )
    }

    pub fn no_errors() -> Self {
        Self::new("no recognized errors in output", CriterionKind::NoErrors)
    }
}

/// The closed set of criterion types.
///
/// Serialized adjacently tagged, e.g. `{"type": "containsText", "value": "Mem:"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CriterionKind {
    ContainsText(String),
    NotContainsText(String),
    ExitCode(i32),
    FileExists(String),
    FileNotExists(String),
    DirectoryExists(String),
    DirectoryNotExists(String),
    RegexMatch(String),
    RegexNotMatch(String),
    OutputLength(LengthRule),
    OutputEmpty,
    OutputNotEmpty,
    CommandSucceeded,
    NoErrors,
}

impl CriterionKind {
    /// The regex carried by this criterion, if any.
    pub fn regex(&self) -> Option<&str> {
        match self {
            CriterionKind::RegexMatch(p) | CriterionKind::RegexNotMatch(p) => Some(p),
            _ => None,
        }
    }

    /// The path and kind a filesystem criterion needs probed, if any.
    pub fn probe_target(&self) -> Option<(&str, PathKind)> {
        match self {
            CriterionKind::FileExists(p) | CriterionKind::FileNotExists(p) => {
                Some((p, PathKind::File))
            }
            CriterionKind::DirectoryExists(p) | CriterionKind::DirectoryNotExists(p) => {
                Some((p, PathKind::Directory))
            }
            _ => None,
        }
    }
}

/// Whether a probe looks for a regular file or a directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    File,
    Directory,
}

/// Comparison operator of an [`LengthRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
        }
    }

    pub fn holds(&self, actual: usize, threshold: usize) -> bool {
        match self {
            Comparison::Equal => actual == threshold,
            Comparison::NotEqual => actual != threshold,
            Comparison::Less => actual < threshold,
            Comparison::LessOrEqual => actual <= threshold,
            Comparison::Greater => actual > threshold,
            Comparison::GreaterOrEqual => actual >= threshold,
        }
    }
}

/// Operator and threshold for `outputLength`, encoded as e.g. `">100"`.
///
/// A bare number means equality.
///
/// ```rust
/// use runbook_core::models::LengthRule;
///
/// let rule: LengthRule = ">=3".parse().unwrap();
/// assert!(rule.matches(3));
/// assert!(!rule.matches(2));
/// assert_eq!(rule.to_string(), ">=3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LengthRule {
    pub op: Comparison,
    pub threshold: usize,
}

impl LengthRule {
    pub fn matches(&self, length: usize) -> bool {
        self.op.holds(length, self.threshold)
    }
}

impl FromStr for LengthRule {
    type Err = RunbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Two-character operators first so ">=" is not read as ">".
        let (op, rest) = [
            ("==", Comparison::Equal),
            ("!=", Comparison::NotEqual),
            ("<=", Comparison::LessOrEqual),
            (">=", Comparison::GreaterOrEqual),
            ("<", Comparison::Less),
            (">", Comparison::Greater),
            ("=", Comparison::Equal),
        ]
        .iter()
        .find_map(|(symbol, op)| s.strip_prefix(symbol).map(|rest| (*op, rest)))
        .unwrap_or((Comparison::Equal, s));

        let threshold = rest.trim().parse::<usize>().map_err(|_| {
            RunbookError::invalid_input("outputLength")
                .with_reason(format!("expected '<op><number>', got '{s}'"))
        })?;

        Ok(Self { op, threshold })
    }
}

impl TryFrom<String> for LengthRule {
    type Error = RunbookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LengthRule> for String {
    fn from(rule: LengthRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for LengthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.threshold)
    }
}
