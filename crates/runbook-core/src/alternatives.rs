//! Selection of a step's declared alternatives.

use crate::{
    error::Result,
    models::{plan::compile, Alternative, CommandOutcome, EnhancedAlternative, Step},
    recovery::RecoveryStrategy,
};

/// The alternative whose trigger matched a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedAlternative<'a> {
    Basic {
        index: usize,
        alternative: &'a Alternative,
    },
    Enhanced {
        index: usize,
        alternative: &'a EnhancedAlternative,
    },
}

impl<'a> MatchedAlternative<'a> {
    pub fn trigger(&self) -> &'a str {
        match *self {
            Self::Basic { alternative, .. } => &alternative.trigger,
            Self::Enhanced { alternative, .. } => &alternative.trigger,
        }
    }

    pub fn apply(&self) -> &'a [String] {
        match *self {
            Self::Basic { alternative, .. } => &alternative.apply,
            Self::Enhanced { alternative, .. } => &alternative.apply,
        }
    }

    pub fn replace_commands(&self) -> &'a [String] {
        match *self {
            Self::Basic { alternative, .. } => &alternative.replace_commands,
            Self::Enhanced { alternative, .. } => &alternative.replace_commands,
        }
    }

    pub fn retry(&self) -> bool {
        match *self {
            Self::Basic { alternative, .. } => alternative.retry,
            Self::Enhanced { alternative, .. } => alternative.retry,
        }
    }

    /// How many times the alternative may be applied within one step.
    pub fn max_attempts(&self) -> u32 {
        match *self {
            Self::Basic { .. } => 1,
            Self::Enhanced { alternative, .. } => alternative.max_attempts.max(1),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        match *self {
            Self::Basic { .. } => 0,
            Self::Enhanced { alternative, .. } => alternative.delay_ms,
        }
    }

    pub fn strategies(&self) -> &'a [RecoveryStrategy] {
        match *self {
            Self::Basic { .. } => &[],
            Self::Enhanced { alternative, .. } => &alternative.strategies,
        }
    }

    pub fn fallback_commands(&self) -> &'a [String] {
        match *self {
            Self::Basic { .. } => &[],
            Self::Enhanced { alternative, .. } => &alternative.fallback_commands,
        }
    }

    /// The command to run after `apply`: the replacement commands chained
    /// with `&&`, else the original command when `retry` is set.
    pub fn rerun_command(&self, original: &str) -> Option<String> {
        let replacements = self.replace_commands();
        if !replacements.is_empty() {
            Some(replacements.join(" && "))
        } else if self.retry() {
            Some(original.to_string())
        } else {
            None
        }
    }
}

/// Finds the first alternative whose trigger matches the combined output.
///
/// Basic alternatives are searched before enhanced ones, each in declaration
/// order. Returns `Ok(None)` when nothing matches.
///
/// # Errors
///
/// Returns [`crate::RunbookError::InvalidRegex`] when a trigger does not
/// compile.
pub fn resolve<'a>(step: &'a Step, outcome: &CommandOutcome) -> Result<Option<MatchedAlternative<'a>>> {
    for (index, alternative) in step.alternatives.iter().enumerate() {
        if compile(&alternative.trigger)?.is_match(&outcome.combined) {
            return Ok(Some(MatchedAlternative::Basic { index, alternative }));
        }
    }
    for (index, alternative) in step.enhanced_alternatives.iter().enumerate() {
        if compile(&alternative.trigger)?.is_match(&outcome.combined) {
            return Ok(Some(MatchedAlternative::Enhanced { index, alternative }));
        }
    }
    Ok(None)
}
