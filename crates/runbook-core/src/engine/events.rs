//! Progress notifications for user interfaces.

use tokio::sync::mpsc::UnboundedSender;

use crate::models::{PlanStatus, RecoveryAttempt, StepStatus};

/// Something observable happened during a run.
///
/// Events are advisory. The authoritative record is the
/// [`crate::models::PlanExecutionResult`] returned when the run stops.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    PlanStarted {
        plan_id: String,
        title: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        step_id: String,
        title: String,
        command: String,
    },
    AlternativeApplied {
        step_id: String,
        trigger: String,
        command: String,
    },
    RecoveryAttempted {
        step_id: String,
        attempt: RecoveryAttempt,
    },
    StepFinished {
        step_id: String,
        status: StepStatus,
        duration_ms: u64,
    },
    CheckpointReached {
        step_id: String,
        instructions: String,
    },
    PlanFinished {
        status: PlanStatus,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<UnboundedSender<ProgressEvent>>);

impl EventSink {
    pub(crate) fn new(sender: Option<UnboundedSender<ProgressEvent>>) -> Self {
        Self(sender)
    }

    /// A dropped receiver is not an error; the run continues unobserved.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }
}
