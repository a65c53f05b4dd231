//! Plan model definition and related functionality.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use jiff::Timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Criterion, Step};
use crate::error::{Result, RunbookError};

/// Default total-time budget of a plan.
pub const DEFAULT_MAX_TOTAL_TIME_SECS: u64 = 3600;

/// Default total retry budget of a plan.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

static PLAN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates a process-unique plan identifier such as `plan-18c0f5a2b1e-3`.
pub fn generate_plan_id() -> String {
    let millis = Timestamp::now().as_millisecond();
    let seq = PLAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("plan-{millis:x}-{seq:x}")
}

fn default_max_total_time_secs() -> u64 {
    DEFAULT_MAX_TOTAL_TIME_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// An ordered set of steps plus global criteria and execution budgets.
///
/// Plans are read-only configuration: the engine only ever borrows them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Generated identifier
    #[serde(default = "generate_plan_id")]
    pub id: String,

    /// Title of the plan
    pub title: String,

    /// Detailed multi-line description of the plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Steps, executed strictly in this order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Evaluated once against the concatenated output of every step
    #[serde(default)]
    pub success_criteria: Vec<Criterion>,

    #[serde(default)]
    pub failure_criteria: Vec<Criterion>,

    /// No step starts once this much recorded time has been spent
    #[serde(default = "default_max_total_time_secs")]
    pub max_total_time_secs: u64,

    /// Alternative applications allowed across the whole plan
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Environment shared by every step
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Commands prepended to every step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_commands: Vec<String>,
}

impl Plan {
    /// Creates an empty plan with a fresh identifier and default budgets.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_plan_id(),
            title: title.into(),
            description: None,
            steps: Vec::new(),
            success_criteria: Vec::new(),
            failure_criteria: Vec::new(),
            max_total_time_secs: DEFAULT_MAX_TOTAL_TIME_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            environment: BTreeMap::new(),
            pre_commands: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_max_total_time_secs(mut self, secs: u64) -> Self {
        self.max_total_time_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_pre_command(mut self, command: impl Into<String>) -> Self {
        self.pre_commands.push(command.into());
        self
    }

    pub fn max_total_time(&self) -> Duration {
        Duration::from_secs(self.max_total_time_secs)
    }

    /// Parses a plan from JSON and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Reads, parses and validates a plan file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| RunbookError::FileSystem {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or duplicate step id, a zero
    /// timeout, or any regex (criterion or alternative trigger) that does not
    /// compile.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(RunbookError::invalid_input("title").with_reason("must not be empty"));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(RunbookError::invalid_input("steps.id")
                    .with_reason(format!("step '{}' has an empty id", step.title)));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(RunbookError::invalid_input("steps.id")
                    .with_reason(format!("duplicate step id '{}'", step.id)));
            }
            if step.timeout_secs == 0 {
                return Err(RunbookError::invalid_input("timeout_secs")
                    .with_reason(format!("step '{}' must have a positive timeout", step.id)));
            }

            let triggers = step
                .alternatives
                .iter()
                .map(|a| a.trigger.as_str())
                .chain(step.enhanced_alternatives.iter().map(|a| a.trigger.as_str()));
            for trigger in triggers {
                compile(trigger)?;
            }
            validate_criteria(&step.success_criteria)?;
            validate_criteria(&step.failure_criteria)?;
        }

        validate_criteria(&self.success_criteria)?;
        validate_criteria(&self.failure_criteria)
    }
}

fn validate_criteria(criteria: &[Criterion]) -> Result<()> {
    for pattern in criteria.iter().filter_map(|c| c.check.regex()) {
        compile(pattern)?;
    }
    Ok(())
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| RunbookError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}
