//! Workflow orchestration: framing, parallel fan-out, synthesis.
//!
//! The orchestrator owns no per-decision state of its own. Everything a run
//! mutates (sequence counter, insight aggregator, cancel flag) lives in the
//! [`WorkflowRun`] so several decisions can share one orchestrator.

mod stage;
mod state;

pub use stage::RoleOutcome;
pub use state::WorkflowStage;

use crate::aggregator::{InsightAggregator, InsightSnapshot};
use crate::domain::{
    DecisionId, DecisionRequest, DecisionStatus, EventDraft, Payload, PersonaContext, Phase,
    SequenceCounter, WorkflowError,
};
use crate::event_store::{EventLog, EventSubscription};
use crate::roles::{Role, RoleInput, RoleRegistry};
use futures::future::join_all;
use serde::Serialize;
use stage::{run_role, RunContext};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Default time a role may stay silent before it is considered hung.
pub const DEFAULT_ROLE_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub role_activity_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            role_activity_timeout: DEFAULT_ROLE_ACTIVITY_TIMEOUT,
        }
    }
}

/// Per-decision state for one execution of the workflow.
pub struct WorkflowRun {
    decision_id: DecisionId,
    request: Arc<DecisionRequest>,
    context: Arc<PersonaContext>,
    counter: Arc<SequenceCounter>,
    aggregator: Arc<InsightAggregator>,
    cancel: watch::Receiver<bool>,
}

impl WorkflowRun {
    /// A run that can only be cancelled through `cancel`.
    pub fn new(
        decision_id: DecisionId,
        request: DecisionRequest,
        context: PersonaContext,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            decision_id,
            request: Arc::new(request),
            context: Arc::new(context),
            counter: Arc::new(SequenceCounter::new()),
            aggregator: Arc::new(InsightAggregator::new()),
            cancel,
        }
    }

    /// A run with no way to cancel it.
    pub fn detached(
        decision_id: DecisionId,
        request: DecisionRequest,
        context: PersonaContext,
    ) -> Self {
        let (_, cancel) = watch::channel(false);
        Self::new(decision_id, request, context, cancel)
    }

    pub fn decision_id(&self) -> &DecisionId {
        &self.decision_id
    }

    /// Handle to the insights recorded so far.
    pub fn aggregator(&self) -> Arc<InsightAggregator> {
        self.aggregator.clone()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn input(&self, prior_insights: InsightSnapshot) -> RoleInput {
        RoleInput {
            decision_id: self.decision_id.clone(),
            request: self.request.clone(),
            context: self.context.clone(),
            prior_insights,
        }
    }
}

/// Counts reported in the final `Completed` milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub roles_total: usize,
    pub roles_completed: usize,
    pub roles_failed: usize,
    pub insights: usize,
    /// Events in the decision, including the final milestone.
    pub events: u64,
    pub elapsed_ms: u64,
}

impl WorkflowSummary {
    fn to_payload(&self) -> Result<Payload, WorkflowError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(WorkflowError::Fatal {
                message: format!("summary serialized to non-object: {}", other),
            }),
            Err(e) => Err(WorkflowError::Fatal {
                message: format!("failed to serialize summary: {}", e),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: RoleOutcome) -> Result<(), WorkflowError> {
        match outcome {
            RoleOutcome::Completed => self.completed += 1,
            RoleOutcome::Failed => self.failed += 1,
            RoleOutcome::Cancelled => return Err(WorkflowError::Cancelled),
        }
        Ok(())
    }
}

/// Sequences the roles of a [`RoleRegistry`] for any number of decisions.
pub struct Orchestrator {
    registry: Arc<RoleRegistry>,
    log: Arc<dyn EventLog>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<RoleRegistry>,
        log: Arc<dyn EventLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            log,
            settings,
        }
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn registry(&self) -> &Arc<RoleRegistry> {
        &self.registry
    }

    /// Subscribes to the decision, then drives it in the background.
    ///
    /// Dropping the returned stream does not stop the run.
    pub fn run(self: &Arc<Self>, run: WorkflowRun) -> EventSubscription {
        let subscription = self.log.subscribe(&run.decision_id);
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.drive(run).await;
        });
        subscription
    }

    /// Executes the workflow and records the terminal signal on the log.
    pub async fn drive(&self, run: WorkflowRun) -> DecisionStatus {
        let ctx = self.context(&run);
        match self.execute(&run).await {
            Ok(summary) => {
                tracing::info!(
                    decision_id = %run.decision_id,
                    completed = summary.roles_completed,
                    failed = summary.roles_failed,
                    elapsed_ms = summary.elapsed_ms,
                    "Decision completed"
                );
                self.log.complete(&run.decision_id);
                DecisionStatus::Completed
            }
            Err(WorkflowError::Cancelled) => {
                tracing::info!(decision_id = %run.decision_id, "Decision cancelled");
                ctx.append(EventDraft::milestone(Phase::Error, "decision cancelled"));
                self.log.fail(&run.decision_id, "cancelled");
                DecisionStatus::Cancelled
            }
            Err(err) => {
                let reason = err.to_string();
                tracing::error!(decision_id = %run.decision_id, error = %reason, "Decision failed");
                ctx.append(EventDraft::milestone(Phase::Error, reason.clone()));
                self.log.fail(&run.decision_id, &reason);
                DecisionStatus::Failed
            }
        }
    }

    /// Runs every stage. Role failures are contained; only orchestrator
    /// faults and cancellation surface as errors.
    pub async fn execute(&self, run: &WorkflowRun) -> Result<WorkflowSummary, WorkflowError> {
        let started = Instant::now();
        let ctx = self.context(run);
        let mut stage = WorkflowStage::NotStarted;
        let mut tally = Tally::default();
        let roles_total = self.registry.role_count();

        if self.log.is_complete(&run.decision_id) {
            return Err(WorkflowError::Fatal {
                message: format!("decision {} has already finished", run.decision_id),
            });
        }

        self.ensure_live(run)?;
        stage.transition(WorkflowStage::Framing)?;
        ctx.append(EventDraft::milestone(
            Phase::Starting,
            format!("Evaluating decision with {} roles", roles_total),
        ));
        let framing = self.registry.framing().clone();
        tally.record(self.run_one(&ctx, run, framing).await)?;

        self.ensure_live(run)?;
        stage.transition(WorkflowStage::ParallelAnalysis)?;
        let parallel = self.registry.parallel();
        ctx.append(EventDraft::milestone(
            Phase::Analyzing,
            format!("Running {} roles in parallel", parallel.len()),
        ));
        let prior = run.aggregator.snapshot();
        let outcomes = join_all(parallel.iter().map(|role| {
            run_role(
                ctx.clone(),
                role.clone(),
                run.input(prior.clone()),
                run.cancel.clone(),
            )
        }))
        .await;
        for outcome in outcomes {
            tally.record(outcome)?;
        }

        self.ensure_live(run)?;
        stage.transition(WorkflowStage::Synthesis)?;
        ctx.append(EventDraft::milestone(
            Phase::Reporting,
            format!("Synthesizing {} insights", run.aggregator.len()),
        ));
        let synthesis = self.registry.synthesis().clone();
        tally.record(self.run_one(&ctx, run, synthesis).await)?;

        stage.transition(WorkflowStage::Completed)?;
        let summary = WorkflowSummary {
            roles_total,
            roles_completed: tally.completed,
            roles_failed: tally.failed,
            insights: run.aggregator.len(),
            events: run.counter.current() + 1,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        ctx.append(
            EventDraft::milestone(
                Phase::Completed,
                format!(
                    "{} of {} roles completed",
                    summary.roles_completed, summary.roles_total
                ),
            )
            .with_payload(Some(summary.to_payload()?)),
        );
        Ok(summary)
    }

    async fn run_one(&self, ctx: &RunContext, run: &WorkflowRun, role: Arc<dyn Role>) -> RoleOutcome {
        let input = run.input(run.aggregator.snapshot());
        run_role(ctx.clone(), role, input, run.cancel.clone()).await
    }

    fn ensure_live(&self, run: &WorkflowRun) -> Result<(), WorkflowError> {
        if run.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        Ok(())
    }

    fn context(&self, run: &WorkflowRun) -> RunContext {
        RunContext {
            log: self.log.clone(),
            decision_id: run.decision_id.clone(),
            counter: run.counter.clone(),
            aggregator: run.aggregator.clone(),
            activity_timeout: self.settings.role_activity_timeout,
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
