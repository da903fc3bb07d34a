//! Per-reader subscription stream.
//!
//! A subscription first replays the snapshot taken at registration time and
//! then drains its private channel. A cursor holding the last delivered
//! sequence number filters anything at or below it, so an event can never be
//! yielded twice across the replay/live boundary.

use crate::domain::{DecisionEvent, DecisionId};
use crate::event_store::memory_store::DecisionLog;
use futures::Stream;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Terminal signal recorded for a decision.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    Completed,
    Failed(String),
}

/// Item delivered through a subscriber's private channel.
pub(crate) enum Delivery {
    Event(DecisionEvent),
    Terminal(Terminal),
}

/// Final item of a stream whose decision failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub reason: String,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decision failed: {}", self.reason)
    }
}

impl std::error::Error for StreamFailure {}

/// Removes the subscriber's channel from the broadcast set on drop.
pub(crate) struct Registration {
    log: Arc<DecisionLog>,
    subscriber_id: u64,
}

impl Registration {
    pub(crate) fn new(log: Arc<DecisionLog>, subscriber_id: u64) -> Self {
        Self { log, subscriber_id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.log.unsubscribe(self.subscriber_id);
    }
}

/// Lazy stream of a decision's events: replayed history, then live appends.
///
/// Ends cleanly when the decision completes, yields a single
/// [`StreamFailure`] when it fails, and unregisters itself when dropped.
pub struct EventSubscription {
    decision_id: DecisionId,
    backlog: VecDeque<DecisionEvent>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    pending_terminal: Option<Terminal>,
    last_sequence: Option<u64>,
    registration: Option<Registration>,
    finished: bool,
}

impl EventSubscription {
    pub(crate) fn live(
        decision_id: DecisionId,
        snapshot: Vec<DecisionEvent>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
        registration: Registration,
    ) -> Self {
        Self {
            decision_id,
            backlog: snapshot.into(),
            receiver: Some(receiver),
            pending_terminal: None,
            last_sequence: None,
            registration: Some(registration),
            finished: false,
        }
    }

    /// Subscription on a decision that was already terminal: replay only.
    pub(crate) fn terminated(
        decision_id: DecisionId,
        snapshot: Vec<DecisionEvent>,
        terminal: Terminal,
    ) -> Self {
        Self {
            decision_id,
            backlog: snapshot.into(),
            receiver: None,
            pending_terminal: Some(terminal),
            last_sequence: None,
            registration: None,
            finished: false,
        }
    }

    pub fn decision_id(&self) -> &DecisionId {
        &self.decision_id
    }

    /// Sequence number of the last event yielded, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    fn accept(&mut self, event: &DecisionEvent) -> bool {
        match self.last_sequence {
            Some(last) if event.sequence <= last => false,
            _ => {
                self.last_sequence = Some(event.sequence);
                true
            }
        }
    }

    fn finish(
        &mut self,
        terminal: Option<Terminal>,
    ) -> Poll<Option<Result<DecisionEvent, StreamFailure>>> {
        self.finished = true;
        self.receiver = None;
        self.registration = None;
        match terminal {
            Some(Terminal::Failed(reason)) => Poll::Ready(Some(Err(StreamFailure { reason }))),
            Some(Terminal::Completed) | None => Poll::Ready(None),
        }
    }
}

impl Stream for EventSubscription {
    type Item = Result<DecisionEvent, StreamFailure>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        while let Some(event) = this.backlog.pop_front() {
            if this.accept(&event) {
                return Poll::Ready(Some(Ok(event)));
            }
        }

        if let Some(terminal) = this.pending_terminal.take() {
            return this.finish(Some(terminal));
        }

        loop {
            let polled = match this.receiver.as_mut() {
                Some(receiver) => receiver.poll_recv(cx),
                None => Poll::Ready(None),
            };
            match polled {
                Poll::Ready(Some(Delivery::Event(event))) => {
                    if this.accept(&event) {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                Poll::Ready(Some(Delivery::Terminal(terminal))) => {
                    return this.finish(Some(terminal));
                }
                // Sender dropped without a terminal signal.
                Poll::Ready(None) => return this.finish(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
