//! Execution of a single role inside a workflow stage.
//!
//! Every role runs in its own task so that a panic surfaces as a `JoinError`
//! instead of tearing down the orchestrator. Whatever goes wrong inside the
//! task is reported as exactly one `Error` event for that role.

use crate::aggregator::InsightAggregator;
use crate::domain::{DecisionEvent, DecisionId, EventDraft, Phase, SequenceCounter};
use crate::event_store::EventLog;
use crate::roles::{Role, RoleInput};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Final state of one role within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Shared handles every role task of one run appends through.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) log: Arc<dyn EventLog>,
    pub(crate) decision_id: DecisionId,
    pub(crate) counter: Arc<SequenceCounter>,
    pub(crate) aggregator: Arc<InsightAggregator>,
    pub(crate) activity_timeout: Duration,
}

impl RunContext {
    pub(crate) fn append(&self, draft: EventDraft) -> DecisionEvent {
        self.log
            .append_draft(&self.decision_id, &self.counter, draft)
    }
}

/// How the role's own stream ended.
enum StreamEnd {
    Completed,
    /// The role emitted its own `Error` event.
    Reported,
    Failed(String),
    /// The cancel flag was raised before the next update was appended.
    Cancelled,
}

/// Resolves once the cancel flag is raised. Never resolves if the sender is gone.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

/// Runs `role` to completion, containing every failure mode as one event.
pub(crate) async fn run_role(
    ctx: RunContext,
    role: Arc<dyn Role>,
    input: RoleInput,
    mut cancel: watch::Receiver<bool>,
) -> RoleOutcome {
    let role_id = role.id().clone();
    tracing::debug!(decision_id = %ctx.decision_id, role = %role_id, "Role started");

    let task_ctx = ctx.clone();
    let task_cancel = cancel.clone();
    let mut handle =
        tokio::spawn(async move { consume(&task_ctx, role, input, task_cancel).await });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = cancelled(&mut cancel) => {
            handle.abort();
            // The task only stops at its next yield point; wait for it so no
            // role event lands after the caller records the cancellation.
            if handle.await.is_err_and(|e| e.is_panic()) {
                tracing::warn!(
                    decision_id = %ctx.decision_id,
                    role = %role_id,
                    "Role panicked while being cancelled"
                );
            }
            tracing::info!(decision_id = %ctx.decision_id, role = %role_id, "Role cancelled");
            return RoleOutcome::Cancelled;
        }
    };

    let reason = match joined {
        Ok(StreamEnd::Cancelled) => {
            tracing::info!(decision_id = %ctx.decision_id, role = %role_id, "Role cancelled");
            return RoleOutcome::Cancelled;
        }
        Ok(StreamEnd::Completed) => {
            tracing::debug!(decision_id = %ctx.decision_id, role = %role_id, "Role completed");
            return RoleOutcome::Completed;
        }
        Ok(StreamEnd::Reported) => {
            tracing::warn!(decision_id = %ctx.decision_id, role = %role_id, "Role reported an error");
            return RoleOutcome::Failed;
        }
        Ok(StreamEnd::Failed(reason)) => reason,
        Err(e) if e.is_panic() => format!("role panicked: {}", panic_message(e.into_panic())),
        Err(e) => format!("role task aborted: {}", e),
    };

    tracing::warn!(decision_id = %ctx.decision_id, role = %role_id, reason = %reason, "Role failed");
    ctx.append(EventDraft::new(role_id, Phase::Error, reason));
    RoleOutcome::Failed
}

async fn consume(
    ctx: &RunContext,
    role: Arc<dyn Role>,
    input: RoleInput,
    cancel: watch::Receiver<bool>,
) -> StreamEnd {
    let role_id = role.id().clone();
    let mut stream = role.analyze(input);

    loop {
        let next = match tokio::time::timeout(ctx.activity_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                return StreamEnd::Failed(format!(
                    "timed out after {:?} without activity",
                    ctx.activity_timeout
                ))
            }
        };

        match next {
            Some(Ok(update)) => {
                if *cancel.borrow() {
                    return StreamEnd::Cancelled;
                }
                let (draft, insight) = update.into_parts(&role_id);
                let phase = draft.phase;
                ctx.append(draft);
                match phase {
                    Phase::Completed => {
                        // Recorded only after the Completed event is in the log.
                        if let Some(mut insight) = insight {
                            insight.role = role_id.clone();
                            ctx.aggregator.record(insight);
                        }
                        return StreamEnd::Completed;
                    }
                    Phase::Error => return StreamEnd::Reported,
                    _ => {}
                }
            }
            Some(Err(e)) => return StreamEnd::Failed(e.message),
            None => {
                return StreamEnd::Failed("role finished without a completed update".to_string())
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
