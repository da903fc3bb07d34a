use super::*;
use crate::domain::{Phase, RoleId};
use crate::event_store::StreamFailure;
use futures::StreamExt;
use proptest::prelude::*;
use std::time::Duration;

fn draft(message: &str) -> EventDraft {
    EventDraft::new(RoleId::from("analyst"), Phase::Analyzing, message)
}

fn event(decision_id: &DecisionId, sequence: u64) -> DecisionEvent {
    draft(&format!("event {}", sequence)).into_event(decision_id.clone(), sequence)
}

async fn drain(subscription: EventSubscription) -> (Vec<u64>, Option<StreamFailure>) {
    let mut sequences = Vec::new();
    let mut failure = None;
    let mut subscription = subscription;
    while let Some(item) = subscription.next().await {
        match item {
            Ok(event) => sequences.push(event.sequence),
            Err(err) => failure = Some(err),
        }
    }
    (sequences, failure)
}

#[test]
fn test_snapshot_returns_events_in_append_order() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    let appended: Vec<DecisionEvent> = (1..=5).map(|seq| event(&id, seq)).collect();
    for e in &appended {
        store.append(e.clone());
    }
    assert_eq!(store.snapshot(&id), appended);
}

#[test]
fn test_unknown_decision_is_empty_and_not_complete() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("missing");
    assert!(store.snapshot(&id).is_empty());
    assert!(!store.is_complete(&id));
    assert!(store.is_empty());
}

#[test]
fn test_append_draft_assigns_consecutive_sequences() {
    let store = MemoryEventStore::new();
    let counter = SequenceCounter::new();
    let id = DecisionId::from("d-1");
    let first = store.append_draft(&id, &counter, draft("a"));
    let second = store.append_draft(&id, &counter, draft("b"));
    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2);
    assert_eq!(counter.current(), 2);
    assert_eq!(store.snapshot(&id).len(), 2);
}

#[tokio::test]
async fn test_subscriber_receives_history_then_live_events() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    store.append(event(&id, 1));
    store.append(event(&id, 2));

    let subscription = store.subscribe(&id);
    store.append(event(&id, 3));
    store.complete(&id);

    let (sequences, failure) = drain(subscription).await;
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(failure.is_none());
}

#[tokio::test]
async fn test_subscribe_after_complete_replays_and_ends() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    for seq in 1..=4 {
        store.append(event(&id, seq));
    }
    store.complete(&id);
    assert!(store.is_complete(&id));

    let subscription = store.subscribe(&id);
    assert_eq!(store.subscriber_count(&id), 0);
    let (sequences, failure) = drain(subscription).await;
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert!(failure.is_none());
}

#[tokio::test]
async fn test_fail_ends_stream_with_reason() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    let subscription = store.subscribe(&id);
    store.append(event(&id, 1));
    store.fail(&id, "aggregator corrupted");

    let (sequences, failure) = drain(subscription).await;
    assert_eq!(sequences, vec![1]);
    assert_eq!(failure.unwrap().reason, "aggregator corrupted");

    let late = store.subscribe(&id);
    let (sequences, failure) = drain(late).await;
    assert_eq!(sequences, vec![1]);
    assert_eq!(failure.unwrap().reason, "aggregator corrupted");
}

#[tokio::test]
async fn test_first_terminal_signal_wins() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    store.complete(&id);
    store.fail(&id, "too late");

    let (_, failure) = drain(store.subscribe(&id)).await;
    assert!(failure.is_none());
}

#[tokio::test]
async fn test_subscribe_to_unknown_decision_waits_for_events() {
    let store = Arc::new(MemoryEventStore::new());
    let id = DecisionId::from("not-started");
    let subscription = store.subscribe(&id);

    let producer = {
        let store = store.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.append(event(&id, 1));
            store.complete(&id);
        })
    };

    let (sequences, _) = drain(subscription).await;
    producer.await.unwrap();
    assert_eq!(sequences, vec![1]);
}

#[tokio::test]
async fn test_dropped_subscription_unregisters() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("d-1");
    let first = store.subscribe(&id);
    let second = store.subscribe(&id);
    assert_eq!(store.subscriber_count(&id), 2);

    drop(first);
    assert_eq!(store.subscriber_count(&id), 1);

    store.append(event(&id, 1));
    store.complete(&id);
    let (sequences, _) = drain(second).await;
    assert_eq!(sequences, vec![1]);
    assert_eq!(store.subscriber_count(&id), 0);
}

#[tokio::test]
async fn test_two_subscribers_at_different_times_converge() {
    let store = MemoryEventStore::new();
    let counter = SequenceCounter::new();
    let id = DecisionId::from("d-1");

    let early = store.subscribe(&id);
    for i in 0..3 {
        store.append_draft(&id, &counter, draft(&format!("early {}", i)));
    }
    let late = store.subscribe(&id);
    for i in 0..3 {
        store.append_draft(&id, &counter, draft(&format!("late {}", i)));
    }
    store.fail(&id, "boom");

    let (early_seq, early_failure) = drain(early).await;
    let (late_seq, late_failure) = drain(late).await;
    assert_eq!(early_seq, (1..=6).collect::<Vec<_>>());
    assert_eq!(late_seq, early_seq);
    assert_eq!(early_failure, late_failure);
    assert!(early_failure.is_some());
}

#[tokio::test]
async fn test_evict_finished_only_drops_terminal_logs() {
    let store = MemoryEventStore::new();
    let done = DecisionId::from("done");
    let running = DecisionId::from("running");
    store.append(event(&done, 1));
    store.append(event(&running, 1));
    store.complete(&done);

    let evicted = store.evict_finished(chrono::Duration::zero());
    assert_eq!(evicted, vec![done.clone()]);
    assert!(store.snapshot(&done).is_empty());
    assert_eq!(store.snapshot(&running).len(), 1);

    let kept = store.evict_finished(chrono::Duration::hours(1));
    assert!(kept.is_empty());
}

#[tokio::test]
async fn test_subscribe_after_eviction_ends_immediately() {
    let store = MemoryEventStore::new();
    let id = DecisionId::from("pruned");
    store.append(event(&id, 1));
    store.complete(&id);
    assert_eq!(store.evict_finished(chrono::Duration::zero()), vec![id.clone()]);

    let ended = tokio::time::timeout(Duration::from_secs(1), drain(store.subscribe(&id))).await;
    let (sequences, failure) = ended.expect("subscription on an evicted decision must end");
    assert!(sequences.is_empty());
    assert!(failure.is_none());
    assert!(store.is_empty());
    assert!(store.evict_finished(chrono::Duration::zero()).is_empty());
}

#[tokio::test]
async fn test_abandoned_subscription_logs_are_evicted() {
    let store = MemoryEventStore::new();
    let abandoned = DecisionId::from("nobody-home");
    let watched = DecisionId::from("still-watched");

    drop(store.subscribe(&abandoned));
    let _subscription = store.subscribe(&watched);
    assert_eq!(store.len(), 2);

    assert!(store.evict_finished(chrono::Duration::hours(1)).is_empty());
    assert_eq!(store.len(), 1);
    assert_eq!(store.subscriber_count(&watched), 1);

    // Still waits for events, like any never-seen decision.
    store.append(event(&abandoned, 1));
    assert_eq!(store.snapshot(&abandoned).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_and_subscribers_see_gapless_order() {
    const PRODUCERS: u64 = 6;
    const PER_PRODUCER: u64 = 150;
    const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

    let store = Arc::new(MemoryEventStore::new());
    let counter = Arc::new(SequenceCounter::new());
    let id = DecisionId::from("stress");

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let store = store.clone();
        let counter = counter.clone();
        let id = id.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                store.append_draft(&id, &counter, draft(&format!("p{} e{}", p, i)));
                if i % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..8u64 {
        let store = store.clone();
        let id = id.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..r {
                tokio::task::yield_now().await;
            }
            drain(store.subscribe(&id)).await
        }));
    }

    for producer in producers {
        producer.await.unwrap();
    }
    store.complete(&id);

    let expected: Vec<u64> = (1..=TOTAL).collect();
    for reader in readers {
        let (sequences, failure) = reader.await.unwrap();
        assert!(failure.is_none());
        assert_eq!(sequences, expected);
    }
    assert_eq!(store.snapshot(&id).len() as u64, TOTAL);
}

proptest! {
    #[test]
    fn prop_subscriber_attaching_mid_stream_sees_every_event_once(
        total in 1u64..80,
        attach_at in 0u64..80,
        fail_at_end in any::<bool>(),
    ) {
        let attach_at = attach_at.min(total);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (sequences, failure) = runtime.block_on(async {
            let store = MemoryEventStore::new();
            let counter = SequenceCounter::new();
            let id = DecisionId::from("prop");

            for i in 0..attach_at {
                store.append_draft(&id, &counter, draft(&format!("before {}", i)));
            }
            let subscription = store.subscribe(&id);
            for i in attach_at..total {
                store.append_draft(&id, &counter, draft(&format!("after {}", i)));
            }
            if fail_at_end {
                store.fail(&id, "stop");
            } else {
                store.complete(&id);
            }
            drain(subscription).await
        });

        prop_assert_eq!(sequences, (1..=total).collect::<Vec<_>>());
        prop_assert_eq!(failure.is_some(), fail_at_end);
    }
}
