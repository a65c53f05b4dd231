//! Regex-triggered alternatives declared on a step.

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryStrategy;

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    1
}

/// A regex-triggered substitute action for a failing step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alternative {
    /// Regex searched in the combined stdout+stderr of the failed attempt
    pub trigger: String,

    /// Commands run before the original command is retried
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply: Vec<String>,

    /// Commands run instead of the original command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_commands: Vec<String>,

    /// Rerun the original command after `apply` when no replacement is given
    #[serde(default = "default_true")]
    pub retry: bool,
}

impl Alternative {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            apply: Vec::new(),
            replace_commands: Vec::new(),
            retry: true,
        }
    }

    pub fn with_apply(mut self, command: impl Into<String>) -> Self {
        self.apply.push(command.into());
        self
    }

    pub fn with_replacement(mut self, command: impl Into<String>) -> Self {
        self.replace_commands.push(command.into());
        self
    }
}

/// An [`Alternative`] with extra recovery strategies and fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnhancedAlternative {
    pub trigger: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_commands: Vec<String>,

    #[serde(default = "default_true")]
    pub retry: bool,

    /// Strategies tried after the catalog ones when the alternative alone
    /// does not resolve the failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<RecoveryStrategy>,

    /// Commands run once each when everything else failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_commands: Vec<String>,

    /// How many times this alternative may be applied within a step
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause before rerunning after an application
    #[serde(default)]
    pub delay_ms: u64,
}

impl EnhancedAlternative {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            apply: Vec::new(),
            replace_commands: Vec::new(),
            retry: true,
            strategies: Vec::new(),
            fallback_commands: Vec::new(),
            max_attempts: default_max_attempts(),
            delay_ms: 0,
        }
    }
}
