//! Append-only, multi-subscriber event log for decisions.
//!
//! Every decision owns an ordered sequence of events. Readers attach at any
//! time through [`EventLog::subscribe`], receive everything appended so far,
//! and then follow live appends until the decision reaches a terminal signal.

pub mod memory_store;
pub mod subscription;

pub use memory_store::MemoryEventStore;
pub use subscription::{EventSubscription, StreamFailure};

use crate::domain::{DecisionEvent, DecisionId, EventDraft, SequenceCounter};

/// Abstract append-only, subscribable event log keyed by decision.
pub trait EventLog: Send + Sync {
    /// Appends an already-sequenced event and broadcasts it to live subscribers.
    fn append(&self, event: DecisionEvent);

    /// Sequences `draft` from `counter` and appends it in one critical section,
    /// so allocation order always equals append order.
    fn append_draft(
        &self,
        decision_id: &DecisionId,
        counter: &SequenceCounter,
        draft: EventDraft,
    ) -> DecisionEvent;

    /// Returns every event appended so far, in append order.
    fn snapshot(&self, decision_id: &DecisionId) -> Vec<DecisionEvent>;

    /// Replays the snapshot, then follows live events until a terminal signal.
    fn subscribe(&self, decision_id: &DecisionId) -> EventSubscription;

    /// Marks the decision as successfully finished.
    fn complete(&self, decision_id: &DecisionId);

    /// Marks the decision as failed; subscribers end with `reason`.
    fn fail(&self, decision_id: &DecisionId, reason: &str);

    /// Returns true once `complete` or `fail` has been recorded.
    fn is_complete(&self, decision_id: &DecisionId) -> bool;
}
