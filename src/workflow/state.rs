//! Stage sequencing for a single workflow run.

use crate::domain::WorkflowError;

/// Where a run currently is in the framing / fan-out / synthesis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowStage {
    #[default]
    NotStarted,
    Framing,
    ParallelAnalysis,
    Synthesis,
    Completed,
    Cancelled,
    Failed,
}

impl WorkflowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStage::Completed | WorkflowStage::Cancelled | WorkflowStage::Failed
        )
    }

    /// Moves to `to`, rejecting anything but the next forward step or an abort.
    pub fn transition(&mut self, to: WorkflowStage) -> Result<(), WorkflowError> {
        let valid = match (*self, to) {
            (WorkflowStage::NotStarted, WorkflowStage::Framing)
            | (WorkflowStage::Framing, WorkflowStage::ParallelAnalysis)
            | (WorkflowStage::ParallelAnalysis, WorkflowStage::Synthesis)
            | (WorkflowStage::Synthesis, WorkflowStage::Completed) => true,
            (from, WorkflowStage::Cancelled | WorkflowStage::Failed) => !from.is_terminal(),
            _ => false,
        };

        if valid {
            tracing::trace!(from = ?self, to = ?to, "Workflow stage changed");
            *self = to;
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                message: format!("workflow stage {:?} -> {:?}", self, to),
            })
        }
    }
}
