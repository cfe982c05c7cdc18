//! Task orchestration engine: store, scheduling loop, dispatch pipeline and
//! decomposition parser.
//!
//! Projects and tasks live in an in-memory [`TaskStore`]. A periodic
//! [`Scheduler`] feeds dependency-satisfied pending tasks to the
//! [`Dispatcher`], which runs each one on the best-ranked agent under a
//! global concurrency ceiling. Planning text returned by an agent is turned
//! into tasks by [`parse_decomposition`].
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade owning the store, dispatcher and scheduler.
//! - [`TaskStore`]: Task/project records and the priority-ordered queue.
//! - [`Dispatcher`]: Sends one task to one agent and reconciles the result.
//! - [`Scheduler`]: Cancellable periodic loop with single-step `tick()`.
//! - [`InFlightTracker`]: In-flight set enforcing the concurrency ceiling.

/// Capacity metrics, advisory per-agent limits and planning.
pub mod capacity;
/// `[orchestrator]` configuration.
pub mod config;
/// Decomposition parser and prompt.
pub mod decomposer;
/// The dispatch pipeline.
pub mod dispatch;
/// Engine facade.
pub mod engine;
/// Git auto-commit and notification hooks.
pub mod hooks;
/// In-flight tracking.
pub mod monitor;
/// Applying decomposition and refinement to projects.
pub mod planning;
/// Periodic scheduling loop.
pub mod scheduler;
/// Task/project store.
pub mod store;

pub use capacity::{
    AgentCapacity, CapacityMetrics, CapacityPlanner, RebalancePlan, Recommendation,
    RecommendationKind, ThresholdPlanner,
};
pub use config::{OrchestratorConfig, MAX_CONCURRENT_TASKS_ENV};
pub use decomposer::{decomposition_prompt, parse_decomposition};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use engine::{DecompositionResult, Orchestrator, DECOMPOSITION_KIND};
pub use hooks::{
    CommandGitCommitter, GitCommitter, Hooks, NoopGitCommitter, NoopNotifier, Notification,
    Notifier, WebhookNotifier,
};
pub use monitor::{InFlightEntry, InFlightTracker};
pub use planning::{DependencyEdge, RefinementDiff, RefinementReport, TaskUpdate};
pub use scheduler::{Scheduler, SchedulerHandle, SkipReason, TickReport};
pub use store::TaskStore;
