//! Scripted in-process roles for exercising the orchestrator.

use crate::domain::{Confidence, Insight, RoleId};
use crate::roles::{Role, RoleError, RoleInput, RoleStream, RoleUpdate};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Update(RoleUpdate),
    Fail(String),
    Delay(Duration),
    /// Blocks the worker thread without yielding.
    Block(Duration),
    Panic,
    Hang,
}

/// Role that replays a fixed list of steps and records every input it saw.
pub(crate) struct ScriptedRole {
    id: RoleId,
    steps: Vec<Step>,
    inputs: Arc<Mutex<Vec<RoleInput>>>,
}

impl ScriptedRole {
    pub(crate) fn new(id: &str, steps: Vec<Step>) -> Self {
        Self {
            id: RoleId::from(id),
            steps,
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn insight(id: &str) -> Insight {
        Insight::new(RoleId::from(id), format!("{} verdict", id), Confidence::from(0.75))
            .with_findings(vec![format!("{} finding", id)])
    }

    /// One progress update, then a completed update with an insight.
    pub(crate) fn succeeding(id: &str) -> Self {
        Self::new(
            id,
            vec![
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Update(RoleUpdate::completed(Self::insight(id))),
            ],
        )
    }

    pub(crate) fn failing_midway(id: &str) -> Self {
        Self::new(
            id,
            vec![
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Fail(format!("{} lost its data source", id)),
            ],
        )
    }

    pub(crate) fn panicking(id: &str) -> Self {
        Self::new(
            id,
            vec![
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Panic,
            ],
        )
    }

    pub(crate) fn hanging(id: &str) -> Self {
        Self::new(
            id,
            vec![
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Hang,
            ],
        )
    }

    /// Ends without ever yielding a completed update.
    pub(crate) fn silent(id: &str) -> Self {
        Self::new(
            id,
            vec![Step::Update(RoleUpdate::progress(format!("{} working", id)))],
        )
    }

    /// Delays before each step.
    pub(crate) fn slow(id: &str, delay: Duration) -> Self {
        Self::new(
            id,
            vec![
                Step::Delay(delay),
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Delay(delay),
                Step::Update(RoleUpdate::completed(Self::insight(id))),
            ],
        )
    }

    /// Reports progress, then holds its worker thread before the next update.
    pub(crate) fn busy(id: &str, block: Duration) -> Self {
        Self::new(
            id,
            vec![
                Step::Update(RoleUpdate::progress(format!("{} working", id))),
                Step::Block(block),
                Step::Update(RoleUpdate::progress("late work")),
                Step::Update(RoleUpdate::completed(Self::insight(id))),
            ],
        )
    }

    /// Shared handle to the inputs this role has been started with.
    pub(crate) fn inputs(&self) -> Arc<Mutex<Vec<RoleInput>>> {
        self.inputs.clone()
    }

    pub(crate) fn arc(self) -> Arc<dyn Role> {
        Arc::new(self)
    }
}

impl Role for ScriptedRole {
    fn id(&self) -> &RoleId {
        &self.id
    }

    fn analyze(&self, input: RoleInput) -> RoleStream {
        self.inputs.lock().unwrap().push(input);
        let steps: VecDeque<Step> = self.steps.clone().into();
        stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    Step::Update(update) => return Some((Ok(update), steps)),
                    Step::Fail(message) => return Some((Err(RoleError::new(message)), steps)),
                    Step::Delay(delay) => tokio::time::sleep(delay).await,
                    Step::Block(duration) => std::thread::sleep(duration),
                    Step::Panic => panic!("scripted role panicked"),
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        })
        .boxed()
    }
}
