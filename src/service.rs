//! Decision submission, status tracking and retention.

use crate::domain::{
    Decision, DecisionEvent, DecisionId, DecisionRequest, DecisionStatus, WorkflowError,
};
use crate::event_store::{EventLog, EventSubscription, MemoryEventStore};
use crate::persona::PersonaCatalog;
use crate::roles::RoleRegistry;
use crate::workflow::{Orchestrator, OrchestratorSettings, WorkflowRun};
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

struct DecisionEntry {
    record: RwLock<Decision>,
    cancel: watch::Sender<bool>,
}

impl DecisionEntry {
    fn read(&self) -> Decision {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<F>(&self, f: F) -> Result<(), WorkflowError>
    where
        F: FnOnce(&mut Decision) -> Result<(), WorkflowError>,
    {
        let mut record = self.record.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut record)
    }
}

/// Front door for running decisions in the background.
pub struct DecisionService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryEventStore>,
    personas: Arc<dyn PersonaCatalog>,
    decisions: DashMap<DecisionId, Arc<DecisionEntry>>,
}

impl DecisionService {
    pub fn new(
        registry: Arc<RoleRegistry>,
        store: Arc<MemoryEventStore>,
        personas: Arc<dyn PersonaCatalog>,
        settings: OrchestratorSettings,
    ) -> Self {
        let log: Arc<dyn EventLog> = store.clone();
        Self {
            orchestrator: Arc::new(Orchestrator::new(registry, log, settings)),
            store,
            personas,
            decisions: DashMap::new(),
        }
    }

    pub fn log(&self) -> Arc<dyn EventLog> {
        self.store.clone()
    }

    /// Registers a decision and starts it in the background.
    pub async fn submit(&self, request: DecisionRequest) -> Result<DecisionId, WorkflowError> {
        let (entry, run) = self.prepare(request).await?;
        let id = run.decision_id().clone();
        self.launch(entry, run);
        Ok(id)
    }

    /// Like [`submit`](Self::submit), but subscribes before the run starts so
    /// the stream includes the very first event.
    pub async fn submit_and_stream(
        &self,
        request: DecisionRequest,
    ) -> Result<(DecisionId, EventSubscription), WorkflowError> {
        let (entry, run) = self.prepare(request).await?;
        let id = run.decision_id().clone();
        let subscription = self.store.subscribe(&id);
        self.launch(entry, run);
        Ok((id, subscription))
    }

    pub fn subscribe(&self, id: &DecisionId) -> EventSubscription {
        self.store.subscribe(id)
    }

    pub fn snapshot(&self, id: &DecisionId) -> Vec<DecisionEvent> {
        self.store.snapshot(id)
    }

    pub fn is_complete(&self, id: &DecisionId) -> bool {
        self.store.is_complete(id)
    }

    /// The decision record with its events filled in from the log.
    pub fn decision(&self, id: &DecisionId) -> Option<Decision> {
        let entry = self.decisions.get(id)?.value().clone();
        let mut decision = entry.read();
        decision.events = self.store.snapshot(id);
        Some(decision)
    }

    pub fn status(&self, id: &DecisionId) -> Option<DecisionStatus> {
        self.decisions.get(id).map(|entry| entry.read().status)
    }

    /// Requests cancellation. Returns false if the decision is unknown or
    /// already finished.
    pub fn cancel(&self, id: &DecisionId) -> bool {
        let Some(entry) = self.decisions.get(id).map(|e| e.value().clone()) else {
            return false;
        };
        if entry.read().status.is_terminal() {
            return false;
        }
        tracing::info!(decision_id = %id, "Cancellation requested");
        entry.cancel.send_replace(true);
        true
    }

    /// Forgets decisions whose log finished more than `retention` ago.
    pub fn prune(&self, retention: chrono::Duration) -> usize {
        let evicted = self.store.evict_finished(retention);
        for id in &evicted {
            self.decisions.remove(id);
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Pruned finished decisions");
        }
        evicted.len()
    }

    async fn prepare(
        &self,
        request: DecisionRequest,
    ) -> Result<(Arc<DecisionEntry>, WorkflowRun), WorkflowError> {
        let context = self.personas.lookup(&request.persona).await.ok_or_else(|| {
            WorkflowError::UnknownPersona {
                key: request.persona.clone(),
            }
        })?;

        let id = DecisionId::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let entry = Arc::new(DecisionEntry {
            record: RwLock::new(Decision::new(id.clone(), request.clone(), context.clone())),
            cancel: cancel_tx,
        });
        self.decisions.insert(id.clone(), entry.clone());
        tracing::info!(decision_id = %id, persona = %request.persona, "Decision submitted");

        Ok((entry, WorkflowRun::new(id, request, context, cancel_rx)))
    }

    fn launch(&self, entry: Arc<DecisionEntry>, run: WorkflowRun) {
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let id = run.decision_id().clone();
            if let Err(e) = entry.update(Decision::mark_running) {
                tracing::warn!(decision_id = %id, error = %e, "Could not mark decision running");
            }
            let status = orchestrator.drive(run).await;
            if let Err(e) = entry.update(|d| d.mark_finished(status)) {
                tracing::warn!(decision_id = %id, error = %e, "Could not record final status");
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
