//! Collection wrapper types for displaying groups of domain objects.

use std::{fmt, ops::Index};

use crate::{
    models::RunSummary,
    recovery::{strategies_for, ErrorPattern},
};

/// Newtype wrapper for displaying a list of stored runs.
///
/// # Examples
///
/// ```rust
/// use runbook_core::{display::RunSummaries, models::RunSummary, PlanStatus};
/// use jiff::Timestamp;
///
/// let run = RunSummary {
///     id: 1,
///     plan_id: "plan-1".to_string(),
///     plan_title: "Rotate logs".to_string(),
///     status: PlanStatus::Completed,
///     started_at: Timestamp::now(),
///     ended_at: None,
///     total_steps: 3,
///     succeeded_steps: 3,
/// };
///
/// let output = RunSummaries(vec![run]).to_string();
/// assert!(output.contains("Rotate logs (ID: 1) (3/3)"));
/// assert_eq!(RunSummaries(vec![]).to_string(), "No runs found.\n");
/// ```
pub struct RunSummaries(pub Vec<RunSummary>);

impl RunSummaries {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&RunSummary> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RunSummary> {
        self.0.iter()
    }
}

impl Index<usize> for RunSummaries {
    type Output = RunSummary;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IntoIterator for RunSummaries {
    type Item = RunSummary;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RunSummaries {
    type Item = &'a RunSummary;
    type IntoIter = std::slice::Iter<'a, RunSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for RunSummaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            writeln!(f, "No runs found.")
        } else {
            for run in &self.0 {
                write!(f, "{run}")?;
            }
            Ok(())
        }
    }
}

/// Classifier report: each detected pattern with the strategies the catalog
/// would try for it, primary pattern first.
pub struct Patterns(pub Vec<ErrorPattern>);

impl Patterns {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn primary(&self) -> Option<ErrorPattern> {
        self.0.first().copied()
    }
}

impl fmt::Display for Patterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No recognized error patterns.");
        }
        for (index, pattern) in self.0.iter().enumerate() {
            let marker = if index == 0 { " (primary)" } else { "" };
            writeln!(f, "- **{pattern}**{marker}: {}", pattern.description())?;
            let strategies = strategies_for(*pattern)
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  - Strategies: {strategies}")?;
        }
        Ok(())
    }
}
