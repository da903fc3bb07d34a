//! Decision record: request, persona context and lifecycle status.

use crate::domain::errors::WorkflowError;
use crate::domain::event::DecisionEvent;
use crate::domain::types::{DecisionId, DecisionStatus, Payload, TimestampUtc};
use serde::{Deserialize, Serialize};

/// The request a caller submits for evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Free-form description of the decision to evaluate.
    pub prompt: String,
    /// Key into the persona catalog.
    pub persona: String,
    #[serde(default)]
    pub attributes: Payload,
}

impl DecisionRequest {
    pub fn new(prompt: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            persona: persona.into(),
            attributes: Payload::new(),
        }
    }
}

/// Domain persona and assumptions the roles evaluate under.
///
/// The orchestrator never interprets this; it is handed to every role as-is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonaContext {
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub attributes: Payload,
}

/// One end-to-end evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub request: DecisionRequest,
    pub context: PersonaContext,
    pub status: DecisionStatus,
    pub submitted_at: TimestampUtc,
    pub started_at: Option<TimestampUtc>,
    pub completed_at: Option<TimestampUtc>,
    /// Events accumulated so far; filled from the event log on read.
    #[serde(default)]
    pub events: Vec<DecisionEvent>,
}

impl Decision {
    pub fn new(id: DecisionId, request: DecisionRequest, context: PersonaContext) -> Self {
        Self {
            id,
            request,
            context,
            status: DecisionStatus::Pending,
            submitted_at: TimestampUtc::now(),
            started_at: None,
            completed_at: None,
            events: Vec::new(),
        }
    }

    /// Pending -> Running.
    pub fn mark_running(&mut self) -> Result<(), WorkflowError> {
        if self.status != DecisionStatus::Pending {
            return Err(WorkflowError::InvalidTransition {
                message: format!("cannot start decision in status {:?}", self.status),
            });
        }
        self.status = DecisionStatus::Running;
        self.started_at = Some(TimestampUtc::now());
        Ok(())
    }

    /// Moves a non-terminal decision into a terminal status.
    ///
    /// A pending decision may be cancelled before it ever starts.
    pub fn mark_finished(&mut self, status: DecisionStatus) -> Result<(), WorkflowError> {
        if !status.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                message: format!("{:?} is not a terminal status", status),
            });
        }
        let allowed = match self.status {
            DecisionStatus::Running => true,
            DecisionStatus::Pending => status == DecisionStatus::Cancelled,
            _ => false,
        };
        if !allowed {
            return Err(WorkflowError::InvalidTransition {
                message: format!("cannot move decision from {:?} to {:?}", self.status, status),
            });
        }
        self.status = status;
        self.completed_at = Some(TimestampUtc::now());
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/decision_tests.rs"]
mod tests;
