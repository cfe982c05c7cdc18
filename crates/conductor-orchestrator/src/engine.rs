use crate::capacity::{
    AgentCapacity, CapacityMetrics, CapacityPlanner, CapacityRegistry, RebalancePlan,
    Recommendation, ThresholdPlanner,
};
use crate::config::OrchestratorConfig;
use crate::decomposer::{decomposition_prompt, parse_decomposition};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::hooks::Hooks;
use crate::planning::{apply_decomposition, apply_refinement, RefinementDiff, RefinementReport};
use crate::scheduler::{Scheduler, SchedulerHandle, TickReport};
use crate::store::TaskStore;
use conductor_agent::AgentDirectory;
use conductor_core::{
    ConductorError, ConductorResult, EngineEvent, EventBus, Priority, Project, ProjectPatch,
    Task, TaskDraft, TaskPatch, TaskStatus, TaskType,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// Metadata key marking the meta-task of a decomposition run.
pub const DECOMPOSITION_KIND: &str = "decomposition";

/// Result of a successful project decomposition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecompositionResult {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub meta_task_id: Uuid,
}

/// The orchestration engine.
///
/// Owns the store, the dispatcher and the scheduler, and is the single
/// entry point the API layer talks to. Every creation is announced on the
/// event bus.
pub struct Orchestrator {
    store: Arc<RwLock<TaskStore>>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<Scheduler>,
    ceiling: Arc<AtomicUsize>,
    capacity: CapacityRegistry,
    planner: Box<dyn CapacityPlanner>,
    events: EventBus,
}

impl Orchestrator {
    /// Create an engine with no-op side-effect hooks.
    pub fn new(config: &OrchestratorConfig, directory: Arc<dyn AgentDirectory>) -> Self {
        Self::with_hooks(config, directory, Hooks::default())
    }

    /// Create an engine with the given side-effect hooks.
    pub fn with_hooks(
        config: &OrchestratorConfig,
        directory: Arc<dyn AgentDirectory>,
        hooks: Hooks,
    ) -> Self {
        let store = Arc::new(RwLock::new(TaskStore::new()));
        let ceiling = Arc::new(AtomicUsize::new(config.max_concurrent_tasks));
        let events = EventBus::default();

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&store),
            directory,
            Arc::clone(&ceiling),
            hooks,
            events.clone(),
        );
        let mut scheduler_wake = None;
        if config.wake_on_completion {
            let wake = Arc::new(Notify::new());
            dispatcher = dispatcher.with_wake(Arc::clone(&wake));
            scheduler_wake = Some(wake);
        }
        let dispatcher = Arc::new(dispatcher);

        let mut scheduler = Scheduler::new(Arc::clone(&dispatcher), config.tick_interval());
        if let Some(wake) = scheduler_wake {
            scheduler = scheduler.with_wake(wake);
        }

        Self {
            store,
            dispatcher,
            scheduler: Arc::new(scheduler),
            ceiling,
            capacity: CapacityRegistry::new(),
            planner: Box::new(ThresholdPlanner::default()),
            events,
        }
    }

    /// Replace the capacity planner.
    pub fn with_planner(mut self, planner: Box<dyn CapacityPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared handle to the store.
    pub fn store(&self) -> &Arc<RwLock<TaskStore>> {
        &self.store
    }

    // --- Projects ---

    pub fn create_project(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        prd: Option<String>,
    ) -> ConductorResult<Project> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConductorError::Validation("project name must not be empty".into()));
        }
        let mut project = Project::new(name, description);
        project.prd = prd;
        self.store.write().insert_project(project.clone());

        info!(project_id = %project.id, name = %project.name, "Project created");
        self.events.publish(EngineEvent::ProjectCreated {
            project: Box::new(project.clone()),
        });
        Ok(project)
    }

    pub fn get_project(&self, id: Uuid) -> ConductorResult<Project> {
        self.store
            .read()
            .project(id)
            .cloned()
            .ok_or_else(|| ConductorError::project_not_found(id))
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.store.read().projects().into_iter().cloned().collect()
    }

    pub fn update_project(&self, id: Uuid, patch: ProjectPatch) -> ConductorResult<Project> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ConductorError::Validation("project name must not be empty".into()));
        }
        self.store.write().update_project(id, patch)
    }

    /// Delete a project and all of its tasks.
    pub fn delete_project(&self, id: Uuid) -> ConductorResult<Project> {
        let (project, tasks) = self.store.write().remove_project(id)?;
        info!(project_id = %id, removed_tasks = tasks.len(), "Project deleted");
        Ok(project)
    }

    pub fn tasks_by_project(&self, project_id: Uuid) -> ConductorResult<Vec<Task>> {
        Ok(self
            .store
            .read()
            .tasks_by_project(project_id)?
            .into_iter()
            .cloned()
            .collect())
    }

    // --- Tasks ---

    /// Store a task for `project_id`, attach it and make it schedulable.
    pub fn create_task(&self, project_id: Uuid, draft: TaskDraft) -> ConductorResult<Task> {
        if draft.title.trim().is_empty() {
            return Err(ConductorError::Validation("task title must not be empty".into()));
        }
        let task = {
            let mut store = self.store.write();
            let id = store.insert_task(draft.into_task(project_id))?;
            store.enqueue(id)?;
            store
                .task(id)
                .cloned()
                .ok_or_else(|| ConductorError::task_not_found(id))?
        };
        info!(task_id = %task.id, project_id = %project_id, title = %task.title, "Task created");
        self.events.publish(EngineEvent::TaskCreated {
            task: Box::new(task.clone()),
        });
        Ok(task)
    }

    pub fn get_task(&self, id: Uuid) -> ConductorResult<Task> {
        self.store
            .read()
            .task(id)
            .cloned()
            .ok_or_else(|| ConductorError::task_not_found(id))
    }

    /// Every task, in creation order.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.read().tasks().into_iter().cloned().collect()
    }

    pub fn update_task(&self, id: Uuid, patch: TaskPatch) -> ConductorResult<Task> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ConductorError::Validation("task title must not be empty".into()));
        }
        self.store.write().update_task(id, patch)
    }

    /// Delete a task. Tasks depending on it are not touched; a task that is
    /// assigned or in progress is refused with `Conflict`.
    pub fn delete_task(&self, id: Uuid) -> ConductorResult<Task> {
        self.store.write().remove_task(id)
    }

    /// Dispatch one task now, outside the scheduling loop.
    pub async fn dispatch_task(&self, id: Uuid) -> ConductorResult<DispatchOutcome> {
        self.dispatcher.dispatch(id).await
    }

    // --- Decomposition ---

    /// Ask an agent to break the project down and materialise its answer.
    ///
    /// The planning request runs as a meta-task through the normal dispatch
    /// pipeline. The meta-task stays in the store for inspection but is not
    /// part of the project's task list.
    pub async fn decompose_project(&self, project_id: Uuid) -> ConductorResult<DecompositionResult> {
        let project = self.get_project(project_id)?;
        let meta = Task::new(
            project_id,
            format!("Decompose project: {}", project.name),
            decomposition_prompt(&project),
        )
        .with_type(TaskType::Requirement)
        .with_priority(Priority::High)
        .with_metadata("kind", serde_json::json!(DECOMPOSITION_KIND));
        let meta_task_id = self.store.write().insert_detached(meta)?;
        info!(project_id = %project_id, meta_task_id = %meta_task_id, "Decomposition started");

        let outcome = match self.dispatcher.dispatch(meta_task_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_unstarted(meta_task_id);
                return Err(e);
            }
        };
        let meta_task = self.get_task(meta_task_id)?;
        if outcome.status != TaskStatus::Completed {
            return Err(ConductorError::Execution(format!(
                "decomposition of project {project_id} failed: {}",
                meta_task.error.unwrap_or_default()
            )));
        }

        let drafts = parse_decomposition(meta_task.output.as_deref().unwrap_or_default());
        let (project, tasks) = {
            let mut store = self.store.write();
            apply_decomposition(&mut store, project_id, drafts)?
        };
        for task in &tasks {
            self.events.publish(EngineEvent::TaskCreated {
                task: Box::new(task.clone()),
            });
        }

        info!(project_id = %project_id, tasks = tasks.len(), "Decomposition applied");
        Ok(DecompositionResult {
            project,
            tasks,
            meta_task_id,
        })
    }

    /// Merge an externally supplied diff into a project's task graph.
    pub fn refine_project(
        &self,
        project_id: Uuid,
        diff: RefinementDiff,
    ) -> ConductorResult<RefinementReport> {
        let report = {
            let mut store = self.store.write();
            apply_refinement(&mut store, project_id, diff)?
        };
        for task in &report.added {
            self.events.publish(EngineEvent::TaskCreated {
                task: Box::new(task.clone()),
            });
        }
        info!(
            project_id = %project_id,
            added = report.added.len(),
            removed = report.removed.len(),
            updated = report.updated.len(),
            "Project refined"
        );
        Ok(report)
    }

    /// Drop a meta-task that never reached an agent.
    fn discard_unstarted(&self, meta_task_id: Uuid) {
        let mut store = self.store.write();
        let unstarted = store
            .task(meta_task_id)
            .is_some_and(|t| t.status == TaskStatus::Pending);
        if unstarted && store.remove_task(meta_task_id).is_ok() {
            debug!(meta_task_id = %meta_task_id, "Discarded undispatched decomposition task");
        }
    }

    // --- Scheduling ---

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Start the periodic scheduling loop.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.scheduler).start()
    }

    /// Run one scheduling pass now.
    pub async fn tick(&self) -> TickReport {
        self.scheduler.tick().await
    }

    // --- Capacity ---

    pub fn max_concurrent_tasks(&self) -> usize {
        self.ceiling.load(Ordering::SeqCst)
    }

    /// Change the ceiling. Takes effect from the next check; running tasks
    /// are never interrupted.
    pub fn set_max_concurrent_tasks(&self, value: usize) {
        let previous = self.ceiling.swap(value, Ordering::SeqCst);
        info!(previous, current = value, "Concurrency ceiling changed");
    }

    pub fn capacity_metrics(&self) -> CapacityMetrics {
        let (pending, eligible) = {
            let store = self.store.read();
            (store.pending_count(), store.eligible().len())
        };
        let in_flight = self.dispatcher.in_flight();
        CapacityMetrics::new(
            self.max_concurrent_tasks(),
            in_flight.len(),
            pending,
            eligible,
            in_flight.per_agent(),
        )
    }

    pub fn agent_capacity(&self, agent_id: &str) -> ConductorResult<AgentCapacity> {
        self.capacity.get(agent_id).ok_or_else(|| {
            ConductorError::NotFound(format!("no capacity record for agent '{agent_id}'"))
        })
    }

    pub fn set_agent_capacity(
        &self,
        agent_id: &str,
        max_concurrent: usize,
    ) -> ConductorResult<AgentCapacity> {
        self.capacity.put(agent_id, max_concurrent)
    }

    pub fn capacity_recommendations(&self) -> Vec<Recommendation> {
        self.planner
            .recommend(&self.capacity_metrics(), &self.capacity.list())
    }

    pub fn rebalance(&self) -> RebalancePlan {
        let plan = self
            .planner
            .rebalance(&self.capacity_metrics(), &self.capacity.list());
        info!(over_limit = plan.over_limit.len(), "Rebalance planned");
        plan
    }
}
