//! Decision events and the shared sequence counter.
//!
//! Events are immutable facts about a decision's progress. Every event in a
//! decision carries a sequence number drawn from that decision's single
//! [`SequenceCounter`], regardless of which role produced it.

use crate::domain::types::{Confidence, DecisionId, Payload, Phase, RoleId, TimestampUtc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A sequenced progress or result record for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub decision_id: DecisionId,
    pub role: RoleId,
    pub phase: Phase,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub sequence: u64,
    pub created_at: TimestampUtc,
}

impl DecisionEvent {
    /// Returns true for orchestrator-level milestones.
    pub fn is_milestone(&self) -> bool {
        self.role.is_workflow()
    }
}

/// An event that has not yet been assigned a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub role: RoleId,
    pub phase: Phase,
    pub message: String,
    pub confidence: Option<Confidence>,
    pub payload: Option<Payload>,
}

impl EventDraft {
    pub fn new(role: RoleId, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            role,
            phase,
            message: message.into(),
            confidence: None,
            payload: None,
        }
    }

    /// Draft for a workflow milestone.
    pub fn milestone(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(RoleId::workflow(), phase, message)
    }

    pub fn with_confidence(mut self, confidence: Option<Confidence>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    /// Stamps the draft into an immutable event.
    pub fn into_event(self, decision_id: DecisionId, sequence: u64) -> DecisionEvent {
        DecisionEvent {
            decision_id,
            role: self.role,
            phase: self.phase,
            message: self.message,
            confidence: self.confidence,
            payload: self.payload,
            sequence,
            created_at: TimestampUtc::now(),
        }
    }
}

/// Monotonic per-decision sequence counter.
///
/// Sequence numbers start at 1. One counter is shared by every stage and every
/// concurrently running role of a decision.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the most recently issued sequence number (0 if none).
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}
