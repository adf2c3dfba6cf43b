//! Unpublish-then-delete sequence behind `EntryStore::delete_entry`.
//!
//! A 422 on the first delete means the entry is published, sits in a workflow
//! or is referenced at platform level. The flow then unpublishes, clears the
//! workflow and retries once; a second refusal is reported as `Protected`.
//! Transient failures of the first delete (429, 5xx, transport) are retried
//! with linear backoff up to the configured budget.

use std::time::Duration;

use super::store::DeleteOutcome;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteStage {
    Deleting { attempt: u32 },
    Unpublishing,
    ClearingWorkflow,
    Retrying,
    Done(DeleteOutcome),
}


/// What the remote call of the current stage returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Success,
    Status { status: u16, message: String },
    Transport(String),
}

impl StepResult {
    fn looks_already_gone(&self) -> bool {
        match self {
            StepResult::Status { status, .. } => *status == 404,
            StepResult::Transport(message) => {
                let lower = message.to_lowercase();
                lower.contains("not found") || lower.contains("404")
            }
            StepResult::Success => false,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            StepResult::Status { status, .. } => *status == 429 || *status >= 500,
            StepResult::Transport(_) => !self.looks_already_gone(),
            StepResult::Success => false,
        }
    }
}

impl DeleteStage {
    pub fn start() -> Self {
        DeleteStage::Deleting { attempt: 1 }
    }

    /// Advances on `result`. `max_retries` bounds the extra attempts of the
    /// first delete on transient failures.
    pub fn next(self, result: StepResult, max_retries: u32) -> DeleteStage {
        match self {
            DeleteStage::Deleting { attempt } => match result {
                StepResult::Success => DeleteStage::Done(DeleteOutcome::Deleted),
                ref r if r.looks_already_gone() => DeleteStage::Done(DeleteOutcome::AlreadyDeleted),
                StepResult::Status { status: 422, .. } => DeleteStage::Unpublishing,
                ref r if r.is_transient() && attempt <= max_retries => DeleteStage::Deleting { attempt: attempt + 1 },
                StepResult::Status { message, .. } | StepResult::Transport(message) => {
                    DeleteStage::Done(DeleteOutcome::Failed(message))
                }
            },
            DeleteStage::Unpublishing => DeleteStage::ClearingWorkflow,
            DeleteStage::ClearingWorkflow => DeleteStage::Retrying,
            DeleteStage::Retrying => match result {
                StepResult::Success => DeleteStage::Done(DeleteOutcome::Deleted),
                ref r if r.looks_already_gone() => DeleteStage::Done(DeleteOutcome::AlreadyDeleted),
                _ => DeleteStage::Done(DeleteOutcome::Protected),
            },
            done @ DeleteStage::Done(_) => done,
        }
    }

    /// Pause before issuing this stage's call. Repeated deletes back off
    /// linearly from `retry_delay`; the unpublish chain lets the platform settle.
    pub fn settle_delay(&self, retry_delay: Duration) -> Duration {
        match self {
            DeleteStage::Deleting { attempt } => retry_delay * attempt.saturating_sub(1),
            DeleteStage::ClearingWorkflow | DeleteStage::Retrying => Duration::from_millis(200),
            _ => Duration::ZERO,
        }
    }
}
