//! Criterion evaluation.
//!
//! Evaluation is pure: the same criterion, outcome and probe snapshot always
//! give the same verdict. Filesystem criteria never touch the filesystem
//! here; the facts they need are resolved beforehand into a
//! [`ProbeSnapshot`] through a [`crate::transport::FilesystemProbe`].

use std::collections::HashMap;

use crate::{
    error::Result,
    models::{plan::compile, CommandOutcome, Criterion, CriterionKind, CriterionResult, PathKind, Step},
    recovery,
};

/// Filesystem facts collected before evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    facts: HashMap<(String, PathKind), bool>,
}

impl ProbeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<String>, kind: PathKind, exists: bool) {
        self.facts.insert((path.into(), kind), exists);
    }

    pub fn with(mut self, path: impl Into<String>, kind: PathKind, exists: bool) -> Self {
        self.record(path, kind, exists);
        self
    }

    /// `None` when the path was never probed.
    pub fn exists(&self, path: &str, kind: PathKind) -> Option<bool> {
        self.facts.get(&(path.to_string(), kind)).copied()
    }

    /// Distinct probe targets of the given criteria, in first-seen order.
    pub fn targets<'a>(criteria: impl IntoIterator<Item = &'a Criterion>) -> Vec<(String, PathKind)> {
        let mut targets: Vec<(String, PathKind)> = Vec::new();
        for (path, kind) in criteria.into_iter().filter_map(|c| c.check.probe_target()) {
            if !targets.iter().any(|(p, k)| p == path && *k == kind) {
                targets.push((path.to_string(), kind));
            }
        }
        targets
    }
}

/// Verdicts of a whole criterion set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub success_results: Vec<CriterionResult>,
    pub failure_results: Vec<CriterionResult>,
}

impl Verdict {
    /// Every success criterion and every failure criterion passed.
    pub fn passed(&self) -> bool {
        self.success_results.iter().all(|r| r.passed) && !self.guard_tripped()
    }

    /// A failure criterion did not hold. Authoritative over success criteria.
    pub fn guard_tripped(&self) -> bool {
        self.failure_results.iter().any(|r| !r.passed)
    }

    pub fn first_failure(&self) -> Option<&CriterionResult> {
        self.failure_results
            .iter()
            .chain(&self.success_results)
            .find(|r| !r.passed)
    }
}

/// Evaluates one criterion against an outcome.
///
/// # Errors
///
/// Returns [`crate::RunbookError::InvalidRegex`] for a regex criterion whose
/// pattern does not compile. That is a configuration error, not a failed
/// verdict.
pub fn evaluate(
    criterion: &Criterion,
    outcome: &CommandOutcome,
    probes: &ProbeSnapshot,
) -> Result<CriterionResult> {
    let output = outcome.combined.as_str();

    let (passed, actual_value, message) = match &criterion.check {
        CriterionKind::ContainsText(text) => {
            let found = output.contains(text.as_str());
            (
                found,
                found.to_string(),
                if found {
                    format!("found '{text}'")
                } else {
                    format!("'{text}' not found in output")
                },
            )
        }
        CriterionKind::NotContainsText(text) => {
            let found = output.contains(text.as_str());
            (
                !found,
                found.to_string(),
                if found {
                    format!("unexpected '{text}' in output")
                } else {
                    format!("'{text}' absent")
                },
            )
        }
        CriterionKind::ExitCode(expected) => {
            let actual = outcome.exit_code;
            (
                actual == *expected,
                actual.to_string(),
                format!("expected exit code {expected}, got {actual}"),
            )
        }
        CriterionKind::FileExists(path) | CriterionKind::DirectoryExists(path) => {
            let (exists, message) = probed(&criterion.check, path, probes);
            (exists, exists.to_string(), message)
        }
        CriterionKind::FileNotExists(path) | CriterionKind::DirectoryNotExists(path) => {
            let (exists, message) = probed(&criterion.check, path, probes);
            (!exists, exists.to_string(), message)
        }
        CriterionKind::RegexMatch(pattern) => {
            let found = compile(pattern)?.find(output).map(|m| m.as_str().to_string());
            (
                found.is_some(),
                found.clone().unwrap_or_default(),
                match found {
                    Some(m) => format!("/{pattern}/ matched '{m}'"),
                    None => format!("/{pattern}/ did not match"),
                },
            )
        }
        CriterionKind::RegexNotMatch(pattern) => {
            let found = compile(pattern)?.find(output).map(|m| m.as_str().to_string());
            (
                found.is_none(),
                found.clone().unwrap_or_default(),
                match found {
                    Some(m) => format!("/{pattern}/ unexpectedly matched '{m}'"),
                    None => format!("/{pattern}/ did not match"),
                },
            )
        }
        CriterionKind::OutputLength(rule) => {
            let length = output.chars().count();
            (
                rule.matches(length),
                length.to_string(),
                format!("output length {length}, required {rule}"),
            )
        }
        CriterionKind::OutputEmpty => {
            let length = output.trim().len();
            (
                length == 0,
                length.to_string(),
                format!("trimmed output length {length}"),
            )
        }
        CriterionKind::OutputNotEmpty => {
            let length = output.trim().len();
            (
                length > 0,
                length.to_string(),
                format!("trimmed output length {length}"),
            )
        }
        CriterionKind::CommandSucceeded => (
            outcome.succeeded(),
            outcome.exit_code.to_string(),
            if outcome.timed_out {
                "command timed out".to_string()
            } else {
                format!("exit code {}", outcome.exit_code)
            },
        ),
        CriterionKind::NoErrors => {
            let patterns = recovery::classify(outcome);
            let names = patterns
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            (
                patterns.is_empty(),
                names.clone(),
                if patterns.is_empty() {
                    "no recognized errors".to_string()
                } else {
                    format!("recognized errors: {names}")
                },
            )
        }
    };

    Ok(CriterionResult {
        description: criterion.description.clone(),
        passed,
        actual_value,
        message,
    })
}

fn probed(kind: &CriterionKind, path: &str, probes: &ProbeSnapshot) -> (bool, String) {
    let what = match kind.probe_target() {
        Some((_, PathKind::Directory)) => "directory",
        _ => "file",
    };
    match kind.probe_target().and_then(|(p, k)| probes.exists(p, k)) {
        Some(true) => (true, format!("{what} '{path}' exists")),
        Some(false) => (false, format!("{what} '{path}' does not exist")),
        None => (false, format!("{what} '{path}' was not probed")),
    }
}

/// Evaluates success criteria and failure guards together.
pub fn evaluate_all(
    success: &[Criterion],
    failure: &[Criterion],
    outcome: &CommandOutcome,
    probes: &ProbeSnapshot,
) -> Result<Verdict> {
    Ok(Verdict {
        success_results: success
            .iter()
            .map(|c| evaluate(c, outcome, probes))
            .collect::<Result<_>>()?,
        failure_results: failure
            .iter()
            .map(|c| evaluate(c, outcome, probes))
            .collect::<Result<_>>()?,
    })
}

/// Evaluates a step's criteria. A step without any criteria is judged by a
/// zero exit code.
pub fn evaluate_step(step: &Step, outcome: &CommandOutcome, probes: &ProbeSnapshot) -> Result<Verdict> {
    if step.has_criteria() {
        evaluate_all(&step.success_criteria, &step.failure_criteria, outcome, probes)
    } else {
        evaluate_all(&[Criterion::command_succeeded()], &[], outcome, probes)
    }
}
