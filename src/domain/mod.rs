//! Domain model for decisions, events and insights.
//!
//! # Architecture
//!
//! - **Types** (`types.rs`): identifiers, phases, statuses, confidence
//! - **Events** (`event.rs`): sequenced facts about a decision's progress
//! - **Insights** (`insight.rs`): the final result each role contributes
//! - **Decision** (`decision.rs`): request, persona context and lifecycle

pub mod decision;
pub mod errors;
pub mod event;
pub mod insight;
pub mod types;

pub use decision::{Decision, DecisionRequest, PersonaContext};
pub use errors::WorkflowError;
pub use event::{DecisionEvent, EventDraft, SequenceCounter};
pub use insight::Insight;
pub use types::{
    Confidence, DecisionId, DecisionStatus, Payload, Phase, RoleId, TimestampUtc,
};
