//! Error types for the decision domain.

use std::fmt::{Display, Formatter};

/// Errors that abort or reject a decision at the orchestrator level.
///
/// Role failures are never reported through this type; they are contained as
/// `Error`-phase events for the failing role.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// Invalid stage or status transition attempted.
    InvalidTransition { message: String },
    /// Submitted request names a persona the catalog does not know.
    UnknownPersona { key: String },
    /// Layout references a role that was never registered.
    UnknownRole { role: String },
    /// Role layout is structurally invalid.
    InvalidLayout { message: String },
    /// The decision was cancelled before it finished.
    Cancelled,
    /// Unrecoverable failure in the orchestrator's own sequencing.
    Fatal { message: String },
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { message } => write!(f, "invalid transition: {}", message),
            Self::UnknownPersona { key } => write!(f, "unknown persona: {}", key),
            Self::UnknownRole { role } => write!(f, "unknown role: {}", role),
            Self::InvalidLayout { message } => write!(f, "invalid role layout: {}", message),
            Self::Cancelled => write!(f, "decision cancelled"),
            Self::Fatal { message } => write!(f, "workflow failure: {}", message),
        }
    }
}

impl std::error::Error for WorkflowError {}
