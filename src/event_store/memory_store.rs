//! In-memory event log implementation.
//!
//! Each decision has its own [`DecisionLog`] guarded by a dedicated mutex, so
//! appends and subscriptions on different decisions never contend. The outer
//! index is a `DashMap` and is only touched to look a log up.
//!
//! The mutex covers the "store then broadcast" step of an append and the
//! "snapshot, check terminal, register" step of a subscription. Because both
//! run under the same lock, a new subscriber sees every event exactly once:
//! either in its snapshot or through its private channel, never both and never
//! neither.

use crate::domain::{DecisionEvent, DecisionId, EventDraft, SequenceCounter, TimestampUtc};
use crate::event_store::subscription::{Delivery, EventSubscription, Registration, Terminal};
use crate::event_store::EventLog;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Event sequence and subscriber set for one decision.
#[derive(Default)]
pub(crate) struct DecisionLog {
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    events: Vec<DecisionEvent>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Delivery>>,
    next_subscriber_id: u64,
    terminal: Option<Terminal>,
    finished_at: Option<TimestampUtc>,
}

impl LogState {
    /// Stores the event and hands a copy to every live subscriber.
    /// Subscribers whose receiver is gone are dropped from the set.
    fn publish(&mut self, event: DecisionEvent) {
        if self.terminal.is_some() {
            tracing::warn!(
                decision_id = %event.decision_id,
                sequence = event.sequence,
                "Event appended after terminal signal"
            );
        }
        self.subscribers
            .retain(|_, tx| tx.send(Delivery::Event(event.clone())).is_ok());
        self.events.push(event);
    }
}

impl DecisionLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, event: DecisionEvent) {
        self.lock().publish(event);
    }

    fn append_draft(
        &self,
        decision_id: &DecisionId,
        counter: &SequenceCounter,
        draft: EventDraft,
    ) -> DecisionEvent {
        let mut state = self.lock();
        let event = draft.into_event(decision_id.clone(), counter.next());
        state.publish(event.clone());
        event
    }

    fn snapshot(&self) -> Vec<DecisionEvent> {
        self.lock().events.clone()
    }

    fn subscribe(self: &Arc<Self>, decision_id: &DecisionId) -> EventSubscription {
        let mut state = self.lock();
        let snapshot = state.events.clone();

        if let Some(terminal) = state.terminal.clone() {
            return EventSubscription::terminated(decision_id.clone(), snapshot, terminal);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber_id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(subscriber_id, tx);
        drop(state);

        tracing::debug!(
            decision_id = %decision_id,
            subscriber_id,
            replayed = snapshot.len(),
            "Subscriber registered"
        );

        EventSubscription::live(
            decision_id.clone(),
            snapshot,
            rx,
            Registration::new(Arc::clone(self), subscriber_id),
        )
    }

    pub(crate) fn unsubscribe(&self, subscriber_id: u64) {
        self.lock().subscribers.remove(&subscriber_id);
    }

    /// Records the first terminal signal; later ones are ignored.
    fn finish(&self, terminal: Terminal) -> bool {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return false;
        }
        for (_, tx) in state.subscribers.drain() {
            let _ = tx.send(Delivery::Terminal(terminal.clone()));
        }
        state.terminal = Some(terminal);
        state.finished_at = Some(TimestampUtc::now());
        true
    }

    fn is_terminal(&self) -> bool {
        self.lock().terminal.is_some()
    }

    fn finished_at(&self) -> Option<TimestampUtc> {
        self.lock().finished_at
    }

    /// True for a log that only exists because someone once subscribed:
    /// no events, no terminal signal, nobody listening.
    fn is_abandoned(&self) -> bool {
        let state = self.lock();
        state.events.is_empty()
            && state.terminal.is_none()
            && state.subscribers.values().all(|tx| tx.is_closed())
    }

    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Process-local event log for all decisions.
#[derive(Default)]
pub struct MemoryEventStore {
    logs: DashMap<DecisionId, Arc<DecisionLog>>,
    /// Decisions evicted by retention, with the eviction time. A subscription
    /// to one of them ends immediately instead of waiting on a fresh log.
    evicted: DashMap<DecisionId, TimestampUtc>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the log for `decision_id`, creating an empty one if needed.
    ///
    /// The map guard is held while `f` runs, so eviction can never detach a
    /// log between lookup and use.
    fn with_log<R>(
        &self,
        decision_id: &DecisionId,
        f: impl FnOnce(&Arc<DecisionLog>) -> R,
    ) -> R {
        if let Some(log) = self.logs.get(decision_id) {
            return f(log.value());
        }
        let log = self.logs.entry(decision_id.clone()).or_default();
        f(log.value())
    }

    fn existing(&self, decision_id: &DecisionId) -> Option<Arc<DecisionLog>> {
        self.logs.get(decision_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of decisions with a log.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Number of subscribers currently registered for live delivery.
    pub fn subscriber_count(&self, decision_id: &DecisionId) -> usize {
        self.existing(decision_id)
            .map(|log| log.subscriber_count())
            .unwrap_or(0)
    }

    /// Drops every log that reached a terminal signal more than `older_than` ago.
    ///
    /// Empty logs left behind by subscribers that went away are dropped too.
    /// Evicted ids are remembered for one more `older_than` period. Returns
    /// the evicted finished decision ids.
    pub fn evict_finished(&self, older_than: chrono::Duration) -> Vec<DecisionId> {
        let cutoff = Utc::now() - older_than;
        self.evicted.retain(|_, evicted_at| evicted_at.0 > cutoff);

        let mut evicted = Vec::new();
        let mut abandoned = 0usize;
        self.logs.retain(|decision_id, log| {
            let expired = log
                .finished_at()
                .is_some_and(|finished| finished.0 <= cutoff);
            if expired {
                evicted.push(decision_id.clone());
                return false;
            }
            if log.is_abandoned() {
                abandoned += 1;
                return false;
            }
            true
        });

        let now = TimestampUtc::now();
        for decision_id in &evicted {
            self.evicted.insert(decision_id.clone(), now);
        }
        if !evicted.is_empty() || abandoned > 0 {
            tracing::info!(
                count = evicted.len(),
                abandoned,
                "Evicted finished decision logs"
            );
        }
        evicted
    }
}

impl EventLog for MemoryEventStore {
    fn append(&self, event: DecisionEvent) {
        let decision_id = event.decision_id.clone();
        self.with_log(&decision_id, |log| log.append(event));
    }

    fn append_draft(
        &self,
        decision_id: &DecisionId,
        counter: &SequenceCounter,
        draft: EventDraft,
    ) -> DecisionEvent {
        self.with_log(decision_id, |log| {
            log.append_draft(decision_id, counter, draft)
        })
    }

    fn snapshot(&self, decision_id: &DecisionId) -> Vec<DecisionEvent> {
        self.existing(decision_id)
            .map(|log| log.snapshot())
            .unwrap_or_default()
    }

    fn subscribe(&self, decision_id: &DecisionId) -> EventSubscription {
        if !self.logs.contains_key(decision_id) && self.evicted.contains_key(decision_id) {
            tracing::debug!(decision_id = %decision_id, "Subscribed to an evicted decision");
            return EventSubscription::terminated(
                decision_id.clone(),
                Vec::new(),
                Terminal::Completed,
            );
        }
        self.with_log(decision_id, |log| log.subscribe(decision_id))
    }

    fn complete(&self, decision_id: &DecisionId) {
        if self.with_log(decision_id, |log| log.finish(Terminal::Completed)) {
            tracing::debug!(decision_id = %decision_id, "Event log completed");
        }
    }

    fn fail(&self, decision_id: &DecisionId, reason: &str) {
        if self.with_log(decision_id, |log| {
            log.finish(Terminal::Failed(reason.to_string()))
        }) {
            tracing::warn!(decision_id = %decision_id, reason, "Event log failed");
        }
    }

    fn is_complete(&self, decision_id: &DecisionId) -> bool {
        self.existing(decision_id)
            .is_some_and(|log| log.is_terminal())
    }
}

#[cfg(test)]
#[path = "tests/memory_store_tests.rs"]
mod tests;
