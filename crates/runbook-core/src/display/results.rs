//! Result wrapper types for displaying operation outcomes.

use std::fmt;
use std::time::Duration;

use super::Patterns;
use crate::{
    models::{step::DEFAULT_STEP_TIMEOUT_SECS, CommandOutcome, Plan, RunSummary},
    params::ClassifyOutput,
    recovery::{self, RecoveryAction, RecoveryStrategy},
};

/// The outcome of validating a plan document.
pub struct ValidationReport<'a> {
    pub plan: &'a Plan,
}

impl<'a> ValidationReport<'a> {
    pub fn new(plan: &'a Plan) -> Self {
        Self { plan }
    }
}

impl fmt::Display for ValidationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Plan '{}' is valid ({} steps)",
            self.plan.title,
            self.plan.steps.len()
        )?;
        writeln!(f)?;
        write!(f, "{}", self.plan)
    }
}

/// The result of deleting a stored run.
pub struct DeleteResult {
    pub run: RunSummary,
}

impl DeleteResult {
    pub fn new(run: RunSummary) -> Self {
        Self { run }
    }
}

impl fmt::Display for DeleteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deleted run with ID: {}", self.run.id)?;
        writeln!(f)?;
        write!(f, "{}", self.run)
    }
}

/// What the classifier makes of a command's output, with the recovery
/// commands the catalog would try.
pub struct ClassificationReport {
    pub patterns: Patterns,
    pub actions: Vec<(RecoveryStrategy, RecoveryAction)>,
}

impl ClassificationReport {
    /// Classifies `params.output`. Recovery commands are only previewed when
    /// the originating command is known.
    pub fn new(params: &ClassifyOutput) -> Self {
        let outcome = CommandOutcome::new(
            params.output.as_str(),
            "",
            params.exit_code.unwrap_or(1),
            Duration::ZERO,
        );
        let actions = params
            .command
            .as_deref()
            .map(|command| {
                recovery::preview(
                    command,
                    &outcome,
                    Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
                )
            })
            .unwrap_or_default();

        Self {
            patterns: Patterns(recovery::classify(&outcome)),
            actions,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Error patterns")?;
        writeln!(f)?;
        write!(f, "{}", self.patterns)?;

        if !self.actions.is_empty() {
            writeln!(f)?;
            writeln!(f, "## Recovery preview")?;
            writeln!(f)?;
            for (strategy, action) in &self.actions {
                write!(f, "- **{strategy}**: `{}`", action.command)?;
                if !action.delay.is_zero() {
                    write!(f, " after {}s", action.delay.as_secs())?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
