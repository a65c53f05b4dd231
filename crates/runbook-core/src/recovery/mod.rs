//! Failure classification and the recovery strategy catalog.
//!
//! Both halves are pure: [`classify`] maps an outcome to the error patterns
//! it shows, [`strategies_for`] maps a pattern to the ordered strategies worth
//! trying, and [`RecoveryStrategy::synthesize`] turns a strategy into a
//! concrete command.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use runbook_core::models::CommandOutcome;
//! use runbook_core::recovery::{classify, strategies_for, ErrorPattern, RecoveryStrategy};
//!
//! let outcome = CommandOutcome::new("", "foobar: command not found", 127, Duration::ZERO);
//! assert_eq!(classify(&outcome), vec![ErrorPattern::CommandNotFound]);
//! assert_eq!(
//!     strategies_for(ErrorPattern::CommandNotFound)[0],
//!     RecoveryStrategy::CommandAlternatives
//! );
//! ```

use std::time::Duration;

use crate::models::CommandOutcome;

pub mod patterns;
pub mod strategies;

pub use patterns::{classify, primary, ErrorPattern};
pub use strategies::{
    extract_path, shell_quote, strategies_for, RecoveryAction, RecoveryContext, RecoveryStrategy,
};

/// The commands catalog recovery would try for a failed `command`, in order.
///
/// Only the primary pattern's strategies are considered. Strategies with
/// nothing to synthesize are left out.
pub fn preview(
    command: &str,
    outcome: &CommandOutcome,
    step_timeout: Duration,
) -> Vec<(RecoveryStrategy, RecoveryAction)> {
    let Some(pattern) = primary(outcome) else {
        return Vec::new();
    };
    let context = RecoveryContext {
        command,
        outcome,
        step_timeout,
    };
    strategies_for(pattern)
        .iter()
        .filter_map(|strategy| strategy.synthesize(&context).map(|action| (*strategy, action)))
        .collect()
}
