//! Display implementations for domain models.
//!
//! All output is markdown, rendered by the CLI's terminal renderer or handed
//! as-is to MCP clients.

use std::fmt;

use super::datetime::{Elapsed, LocalDateTime};
use crate::models::{
    Criterion, CriterionResult, Plan, PlanExecutionResult, PlanStatus, RecoveryAttempt,
    RunSummary, Step, StepExecutionResult, StepStatus,
};

/// Longest output excerpt shown for a step, in lines.
const OUTPUT_TAIL_LINES: usize = 20;

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl fmt::Display for CriterionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.passed { "✓" } else { "✗" };
        writeln!(f, "- {icon} {}: {}", self.description, self.message)
    }
}

impl fmt::Display for RecoveryAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.success { "✓" } else { "✗" };
        writeln!(
            f,
            "- {icon} **{}** `{}` ({})",
            self.strategy,
            self.command,
            Elapsed(self.duration_ms)
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "  - {error}")?;
        }
        Ok(())
    }
}

/// Writes the last lines of `output` as a fenced block.
fn write_output_tail(f: &mut fmt::Formatter<'_>, output: &str) -> fmt::Result {
    let output = output.trim_end();
    if output.is_empty() {
        return Ok(());
    }
    let lines: Vec<&str> = output.lines().collect();
    let skipped = lines.len().saturating_sub(OUTPUT_TAIL_LINES);

    writeln!(f, "#### Output")?;
    writeln!(f)?;
    if skipped > 0 {
        writeln!(f, "_{skipped} earlier lines omitted_")?;
        writeln!(f)?;
    }
    writeln!(f, "```")?;
    for line in &lines[skipped..] {
        writeln!(f, "{line}")?;
    }
    writeln!(f, "```")?;
    writeln!(f)
}

impl fmt::Display for StepExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### {} ({})", self.step_id, self.status.with_icon())?;
        writeln!(f)?;

        if self.status == StepStatus::Skipped {
            writeln!(f, "Not started.")?;
            return writeln!(f);
        }

        writeln!(f, "- Command: `{}`", self.command)?;
        if let Some(code) = self.exit_code {
            writeln!(f, "- Exit code: {code}")?;
        }
        writeln!(f, "- Duration: {}", Elapsed(self.duration_ms))?;
        if let Some(trigger) = &self.matched_alternative {
            writeln!(
                f,
                "- Alternative: /{trigger}/ applied {} time(s)",
                self.retry_count
            )?;
        }
        if let Some(strategy) = self.successful_strategy {
            writeln!(f, "- Recovered with: {strategy}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "- Error: {error}")?;
        }
        writeln!(f)?;

        if !self.success_results.is_empty() || !self.failure_results.is_empty() {
            writeln!(f, "#### Criteria")?;
            writeln!(f)?;
            for result in self.success_results.iter().chain(&self.failure_results) {
                write!(f, "{result}")?;
            }
            writeln!(f)?;
        }

        if !self.recovery_attempts.is_empty() {
            writeln!(f, "#### Recovery attempts")?;
            writeln!(f)?;
            for attempt in &self.recovery_attempts {
                write!(f, "{attempt}")?;
            }
            writeln!(f)?;
        }

        write_output_tail(f, &self.output)
    }
}

impl fmt::Display for PlanExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {} ({})", self.plan_title, self.status.with_icon())?;
        writeln!(f)?;

        writeln!(f, "- Plan: {}", self.plan_id)?;
        writeln!(f, "- Started: {}", LocalDateTime(&self.started_at))?;
        if let Some(ended_at) = &self.ended_at {
            writeln!(f, "- Ended: {}", LocalDateTime(ended_at))?;
        }
        writeln!(f, "- Duration: {}", Elapsed(self.total_duration_ms()))?;
        writeln!(
            f,
            "- Steps: {}/{} succeeded",
            self.succeeded_steps(),
            self.step_results.len()
        )?;
        if self.retries_used > 0 {
            writeln!(f, "- Retries used: {}", self.retries_used)?;
        }

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", self.message)?;
        }

        if let Some(checkpoint) = &self.pending_checkpoint {
            writeln!(f)?;
            writeln!(
                f,
                "> **Checkpoint at `{}`**: {}",
                checkpoint.step_id, checkpoint.instructions
            )?;
        }

        if !self.step_results.is_empty() {
            writeln!(f, "\n## Steps")?;
            writeln!(f)?;
            for step in &self.step_results {
                write!(f, "{step}")?;
            }
        }

        if !self.global_success_results.is_empty() || !self.global_failure_results.is_empty() {
            writeln!(f, "## Global criteria")?;
            writeln!(f)?;
            for result in self
                .global_success_results
                .iter()
                .chain(&self.global_failure_results)
            {
                write!(f, "{result}")?;
            }
        }

        Ok(())
    }
}

impl Step {
    fn fmt_outline(&self, f: &mut fmt::Formatter<'_>, position: usize) -> fmt::Result {
        writeln!(f, "### {position}. {} (`{}`)", self.title, self.id)?;
        writeln!(f)?;

        if let Some(desc) = &self.description {
            writeln!(f, "{desc}")?;
            writeln!(f)?;
        }

        writeln!(f, "- Command: `{}`", self.command)?;
        writeln!(f, "- Timeout: {}s", self.timeout_secs)?;
        for criterion in &self.success_criteria {
            writeln!(f, "- Success: {criterion}")?;
        }
        for criterion in &self.failure_criteria {
            writeln!(f, "- Failure: {criterion}")?;
        }
        let alternatives = self.alternatives.len() + self.enhanced_alternatives.len();
        if alternatives > 0 {
            writeln!(f, "- Alternatives: {alternatives}")?;
        }
        if !self.recovery.auto_recovery {
            writeln!(f, "- Auto-recovery: off")?;
        }
        if let Some(checkpoint) = &self.checkpoint {
            writeln!(f, "- Checkpoint: {}", checkpoint.instructions)?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_outline(f, 1)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.title)?;
        writeln!(f)?;

        writeln!(f, "- ID: {}", self.id)?;
        writeln!(f, "- Time budget: {}s", self.max_total_time_secs)?;
        writeln!(f, "- Retry budget: {}", self.max_retries)?;

        if let Some(desc) = &self.description {
            writeln!(f)?;
            writeln!(f, "{desc}")?;
        }

        if self.steps.is_empty() {
            writeln!(f, "\nNo steps in this plan.")?;
        } else {
            writeln!(f, "\n## Steps")?;
            writeln!(f)?;
            for (index, step) in self.steps.iter().enumerate() {
                step.fmt_outline(f, index + 1)?;
            }
        }

        if !self.success_criteria.is_empty() || !self.failure_criteria.is_empty() {
            writeln!(f, "## Global criteria")?;
            writeln!(f)?;
            for criterion in &self.success_criteria {
                writeln!(f, "- Success: {criterion}")?;
            }
            for criterion in &self.failure_criteria {
                writeln!(f, "- Failure: {criterion}")?;
            }
        }

        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "## {} (ID: {}) ({}/{})",
            self.plan_title, self.id, self.succeeded_steps, self.total_steps
        )?;
        writeln!(f)?;
        writeln!(f, "- **Status**: {}", self.status.with_icon())?;
        writeln!(f, "- **Plan**: {}", self.plan_id)?;
        writeln!(f, "- **Started**: {}", LocalDateTime(&self.started_at))?;
        writeln!(f)
    }
}
