//! Analysis roles: the units of work the orchestrator sequences.
//!
//! A role turns a [`RoleInput`] into a lazy, finite stream of [`RoleUpdate`]s.
//! The orchestrator treats framing, parallel and synthesis roles the same
//! way; only the registry's layout decides which stage a role runs in.

pub mod process;
pub mod protocol;
pub mod registry;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

pub use process::ProcessRole;
pub use registry::{RoleLayout, RoleRegistry};

use crate::aggregator::InsightSnapshot;
use crate::domain::{
    Confidence, DecisionId, DecisionRequest, EventDraft, Insight, Payload, PersonaContext, Phase,
    RoleId,
};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unsequenced progress item yielded by a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub phase: Phase,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Final result; only honoured on a `Completed` update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<Insight>,
}

impl RoleUpdate {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            confidence: None,
            payload: None,
            insight: None,
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(Phase::Analyzing, message)
    }

    /// Completed update carrying the role's insight.
    ///
    /// The event's confidence mirrors the insight's.
    pub fn completed(insight: Insight) -> Self {
        Self {
            phase: Phase::Completed,
            message: insight.summary.clone(),
            confidence: Some(insight.confidence),
            payload: None,
            insight: Some(insight),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Splits the update into the event draft for `role` and its insight.
    pub fn into_parts(self, role: &RoleId) -> (EventDraft, Option<Insight>) {
        let insight = match self.phase {
            Phase::Completed => self.insight,
            _ => None,
        };
        let draft = EventDraft::new(role.clone(), self.phase, self.message)
            .with_confidence(self.confidence)
            .with_payload(self.payload);
        (draft, insight)
    }
}

/// Failure reported by a role's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleError {
    pub message: String,
}

impl RoleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RoleError {}

impl From<anyhow::Error> for RoleError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Everything a role sees when it starts.
#[derive(Debug, Clone, Serialize)]
pub struct RoleInput {
    pub decision_id: DecisionId,
    pub request: Arc<DecisionRequest>,
    pub context: Arc<PersonaContext>,
    /// Insights recorded before this role was launched.
    pub prior_insights: InsightSnapshot,
}

pub type RoleStream = BoxStream<'static, Result<RoleUpdate, RoleError>>;

/// A single analysis capability.
pub trait Role: Send + Sync {
    fn id(&self) -> &RoleId;

    /// Starts the analysis. Nothing runs until the stream is polled.
    fn analyze(&self, input: RoleInput) -> RoleStream;
}
