//! Decision workflow engine.
//!
//! A decision is evaluated by a framing role, a set of roles running in
//! parallel, and a synthesis role. Every step is recorded in an append-only
//! event log that any number of readers can follow live.

pub mod aggregator;
pub mod config;
pub mod domain;
pub mod event_store;
pub mod journal;
pub mod logging;
pub mod paths;
pub mod persona;
pub mod roles;
pub mod service;
pub mod workflow;

pub use aggregator::{InsightAggregator, InsightSnapshot};
pub use event_store::{EventLog, EventSubscription, MemoryEventStore, StreamFailure};
pub use service::DecisionService;
pub use workflow::{Orchestrator, OrchestratorSettings, WorkflowRun};

/// Git commit the binary was built from.
pub const GIT_SHA: &str = env!("DECISION_ENGINE_GIT_SHA");

/// Commit time of [`GIT_SHA`] in Unix seconds, 0 when unknown.
pub const BUILD_TIMESTAMP: &str = env!("DECISION_ENGINE_BUILD_TIMESTAMP");

/// Version string shown by `decide --version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("DECISION_ENGINE_GIT_SHA"),
    ", committed ",
    env!("DECISION_ENGINE_BUILD_TIMESTAMP"),
    ")"
);
