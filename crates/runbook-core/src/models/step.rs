//! Step model definition and related functionality.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Alternative, Criterion, EnhancedAlternative};

/// Default command timeout for a step.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

/// Represents one command plus its success/failure contract within a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Identifier, unique within the plan
    pub id: String,

    /// Brief title/summary of the step
    pub title: String,

    /// Detailed multi-line description of the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Shell command run on the target
    pub command: String,

    /// Every criterion must pass
    #[serde(default)]
    pub success_criteria: Vec<Criterion>,

    /// Guards: any failing criterion fails the step, even if every success
    /// criterion passed
    #[serde(default)]
    pub failure_criteria: Vec<Criterion>,

    /// Free-form hint of what the output should look like
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,

    /// Per-command timeout, must be positive
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variables, overriding plan-level ones with the same name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Commands prepended to the step command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enhanced_alternatives: Vec<EnhancedAlternative>,

    /// Manual confirmation required after the step passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl Step {
    /// Creates a step with default timeout and recovery settings and no
    /// criteria.
    pub fn new(id: impl Into<String>, title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            command: command.into(),
            success_criteria: Vec::new(),
            failure_criteria: Vec::new(),
            expected_output: None,
            timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            environment: BTreeMap::new(),
            pre_commands: Vec::new(),
            alternatives: Vec::new(),
            enhanced_alternatives: Vec::new(),
            checkpoint: None,
            recovery: RecoveryConfig::default(),
        }
    }

    pub fn with_success(mut self, criterion: Criterion) -> Self {
        self.success_criteria.push(criterion);
        self
    }

    pub fn with_failure(mut self, criterion: Criterion) -> Self {
        self.failure_criteria.push(criterion);
        self
    }

    pub fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternatives.push(alternative);
        self
    }

    pub fn with_enhanced_alternative(mut self, alternative: EnhancedAlternative) -> Self {
        self.enhanced_alternatives.push(alternative);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_checkpoint(mut self, instructions: impl Into<String>) -> Self {
        self.checkpoint = Some(Checkpoint {
            instructions: instructions.into(),
        });
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether the step has no criteria at all, in which case a zero exit
    /// code decides.
    pub fn has_criteria(&self) -> bool {
        !self.success_criteria.is_empty() || !self.failure_criteria.is_empty()
    }
}

/// A manual confirmation point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    /// What the operator should verify before confirming
    pub instructions: String,
}

/// Automatic recovery knobs of a step.
///
/// Defaults: recovery on, 3 attempts, 60 seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecoveryConfig {
    pub auto_recovery: bool,
    pub max_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_recovery: true,
            max_attempts: 3,
            timeout_secs: 60,
        }
    }
}

impl RecoveryConfig {
    pub fn disabled() -> Self {
        Self {
            auto_recovery: false,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
