//! End-to-end orchestration tests.
//!
//! Drives the engine through its public API with deterministic mock agents:
//! dependency ordering across ticks, dispatch outcomes and events, queue
//! ordering, the decomposition parser, and the concurrency ceiling under
//! concurrent manual dispatch.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use conductor_agent::{Agent, AgentProfile, AgentRequest, AgentResponse, StaticAgentDirectory};
use conductor_core::{
    ConductorError, ConductorResult, EngineEvent, Priority, Task, TaskDraft, TaskStatus, TaskType,
};
use conductor_orchestrator::*;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Mock agents
// ---------------------------------------------------------------------------

/// Records every call and, for each, the status of the caller-provided
/// watch list at call time.
struct ObservingAgent {
    store: Arc<RwLock<TaskStore>>,
    calls: Mutex<Vec<(Uuid, Vec<TaskStatus>)>>,
    watch: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl Agent for ObservingAgent {
    fn id(&self) -> &str {
        "observer"
    }

    async fn execute(&self, request: AgentRequest) -> ConductorResult<AgentResponse> {
        let watched: Vec<TaskStatus> = {
            let store = self.store.read();
            self.watch
                .lock()
                .iter()
                .filter_map(|id| store.task(*id).map(|t| t.status))
                .collect()
        };
        self.calls.lock().push((request.task_id, watched));
        Ok(AgentResponse::success(format!("did {}", request.prompt), 3))
    }
}

/// Sleeps during execution and tracks peak concurrency.
struct SlowAgent {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowAgent {
    fn new() -> Self {
        Self {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Agent for SlowAgent {
    fn id(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _request: AgentRequest) -> ConductorResult<AgentResponse> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(AgentResponse::success("slow result", 50))
    }
}

/// Signals when a call starts and holds it until released.
struct GatedAgent {
    started: Notify,
    release: Notify,
}

impl GatedAgent {
    fn new() -> Self {
        Self {
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl Agent for GatedAgent {
    fn id(&self) -> &str {
        "gated"
    }

    async fn execute(&self, _request: AgentRequest) -> ConductorResult<AgentResponse> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(AgentResponse::success("released", 9))
    }
}

struct FailingGit;

#[async_trait]
impl GitCommitter for FailingGit {
    async fn commit_task(&self, _task: &Task) -> ConductorResult<()> {
        Err(ConductorError::Execution("fatal: not a git repository".into()))
    }
}

fn draft(title: &str, priority: Priority, dependencies: Vec<Uuid>) -> TaskDraft {
    TaskDraft {
        title: title.into(),
        description: format!("{title} work"),
        task_type: TaskType::Implementation,
        priority,
        dependencies,
        metadata: Default::default(),
    }
}

fn config(ceiling: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent_tasks: ceiling,
        tick_interval_secs: 1,
        wake_on_completion: false,
    }
}

// ---------------------------------------------------------------------------
// Dependency ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dependent_task_runs_strictly_after_its_dependency() {
    let directory = Arc::new(StaticAgentDirectory::new());
    let engine = Orchestrator::new(&config(10), directory.clone());
    let agent = Arc::new(ObservingAgent {
        store: Arc::clone(engine.store()),
        calls: Mutex::new(Vec::new()),
        watch: Mutex::new(Vec::new()),
    });
    directory.register(AgentProfile::new("observer"), agent.clone());

    let project = engine.create_project("Empty PRD", "", Some(String::new())).unwrap();
    let t1 = engine
        .create_task(project.id, draft("T1", Priority::Low, vec![]))
        .unwrap();
    let t2 = engine
        .create_task(project.id, draft("T2", Priority::Critical, vec![t1.id]))
        .unwrap();
    agent.watch.lock().push(t1.id);

    for _ in 0..5 {
        engine.tick().await;
    }

    let calls = agent.calls.lock().clone();
    let order: Vec<Uuid> = calls.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![t1.id, t2.id]);
    // When T2 reached the agent, T1 was already completed.
    assert_eq!(calls[1].1, vec![TaskStatus::Completed]);
    assert_eq!(engine.get_task(t2.id).unwrap().status, TaskStatus::Completed);
}

// ---------------------------------------------------------------------------
// Dispatch outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dispatch_without_agents_keeps_task_pending() {
    let engine = Orchestrator::new(&config(10), Arc::new(StaticAgentDirectory::new()));
    let project = engine.create_project("p", "d", None).unwrap();
    let task = engine
        .create_task(project.id, draft("lonely", Priority::High, vec![]))
        .unwrap();

    let err = engine.dispatch_task(task.id).await.unwrap_err();
    assert!(matches!(err, ConductorError::NoAvailableAgent(_)));
    assert_eq!(err.kind().status_code(), 503);
    assert_eq!(engine.get_task(task.id).unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_success_emits_one_completion_despite_git_failure() {
    let directory = Arc::new(StaticAgentDirectory::new());
    directory.register(AgentProfile::new("slow"), Arc::new(SlowAgent::new()));
    let hooks = Hooks {
        git: Arc::new(FailingGit),
        notifier: Arc::new(NoopNotifier),
    };
    let engine = Orchestrator::with_hooks(&config(10), directory, hooks);
    let project = engine.create_project("p", "d", None).unwrap();
    let task = engine
        .create_task(project.id, draft("commit me", Priority::Medium, vec![]))
        .unwrap();

    let mut rx = engine.events().subscribe();
    let outcome = engine.dispatch_task(task.id).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Completed);

    let stored = engine.get_task(task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.output.as_deref(), Some("slow result"));
    assert_eq!(stored.duration_ms, Some(50));

    let mut completed = 0;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::TaskCompleted { task_id, .. } = event {
            assert_eq!(task_id, task.id);
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

// ---------------------------------------------------------------------------
// Queue ordering and parsing
// ---------------------------------------------------------------------------

#[test]
fn test_queue_is_stable_priority_order() {
    let engine = Orchestrator::new(&config(10), Arc::new(StaticAgentDirectory::new()));
    let project = engine.create_project("p", "d", None).unwrap();
    let mut ids = Vec::new();
    for (title, priority) in [
        ("low", Priority::Low),
        ("critical", Priority::Critical),
        ("medium", Priority::Medium),
        ("high", Priority::High),
    ] {
        ids.push(
            engine
                .create_task(project.id, draft(title, priority, vec![]))
                .unwrap()
                .id,
        );
    }

    let store = engine.store().read();
    assert_eq!(store.queue(), &[ids[1], ids[3], ids[2], ids[0]]);
}

#[test]
fn test_parser_reference_example() {
    let text = "1. Setup auth\ntype: implementation\npriority: high\nDo the auth setup.\n2. Write tests\ntype: test\npriority: medium\nCover auth.";
    let drafts = parse_decomposition(text);
    assert_eq!(drafts.len(), 2);
    assert_eq!(
        (
            drafts[0].title.as_str(),
            drafts[0].task_type,
            drafts[0].priority,
            drafts[0].description.as_str()
        ),
        ("Setup auth", TaskType::Implementation, Priority::High, "Do the auth setup.")
    );
    assert_eq!(
        (
            drafts[1].title.as_str(),
            drafts[1].task_type,
            drafts[1].priority,
            drafts[1].description.as_str()
        ),
        ("Write tests", TaskType::Test, Priority::Medium, "Cover auth.")
    );
    assert_eq!(parse_decomposition(text), drafts);
    assert!(parse_decomposition("no markers at all\njust text").is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ceiling_holds_under_concurrent_manual_dispatch() {
    let directory = Arc::new(StaticAgentDirectory::new());
    let agent = Arc::new(SlowAgent::new());
    directory.register(AgentProfile::new("slow"), agent.clone());
    let engine = Arc::new(Orchestrator::new(&config(2), directory));
    let project = engine.create_project("p", "d", None).unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let task = engine
            .create_task(project.id, draft(&format!("t{i}"), Priority::Medium, vec![]))
            .unwrap();
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move { engine.dispatch_task(task.id).await }));
    }

    let mut exhausted = 0;
    for handle in handles {
        if let Err(ConductorError::CapacityExhausted(_)) = handle.await.unwrap() {
            exhausted += 1;
        }
    }
    assert!(agent.peak.load(Ordering::SeqCst) <= 2);
    assert!(exhausted >= 1);
    // Rejected tasks stay pending for the scheduler.
    assert_eq!(engine.capacity_metrics().pending_tasks, exhausted);
}

#[tokio::test]
async fn test_same_task_is_dispatched_once() {
    let directory = Arc::new(StaticAgentDirectory::new());
    let agent = Arc::new(SlowAgent::new());
    directory.register(AgentProfile::new("slow"), agent.clone());
    let engine = Arc::new(Orchestrator::new(&config(10), directory));
    let project = engine.create_project("p", "d", None).unwrap();
    let task = engine
        .create_task(project.id, draft("contested", Priority::High, vec![]))
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move { engine.dispatch_task(task.id).await }));
    }
    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, ConductorError::Conflict(_))),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(agent.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_running_loop_drains_queue_and_stops() {
    let directory = Arc::new(StaticAgentDirectory::new());
    directory.register(AgentProfile::new("slow"), Arc::new(SlowAgent::new()));
    let engine = Orchestrator::new(
        &OrchestratorConfig {
            wake_on_completion: true,
            ..config(10)
        },
        directory,
    );
    let project = engine.create_project("p", "d", None).unwrap();
    let first = engine
        .create_task(project.id, draft("first", Priority::Medium, vec![]))
        .unwrap();
    let second = engine
        .create_task(project.id, draft("second", Priority::Medium, vec![first.id]))
        .unwrap();

    let handle = engine.start_scheduler();
    for _ in 0..100 {
        if engine.get_task(second.id).unwrap().status == TaskStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.stop().await;

    assert_eq!(engine.get_task(first.id).unwrap().status, TaskStatus::Completed);
    assert_eq!(engine.get_task(second.id).unwrap().status, TaskStatus::Completed);
}

// ---------------------------------------------------------------------------
// Deletion and in-flight work
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_running_task_survives_delete_and_refine() {
    let directory = Arc::new(StaticAgentDirectory::new());
    let agent = Arc::new(GatedAgent::new());
    directory.register(AgentProfile::new("gated"), agent.clone());
    let engine = Arc::new(Orchestrator::new(&config(10), directory));
    let project = engine.create_project("p", "d", None).unwrap();
    let task = engine
        .create_task(project.id, draft("busy", Priority::High, vec![]))
        .unwrap();

    let mut rx = engine.events().subscribe();
    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.dispatch_task(task.id).await })
    };
    agent.started.notified().await;

    let refine = engine.refine_project(
        project.id,
        RefinementDiff {
            removed_task_ids: vec![task.id],
            ..Default::default()
        },
    );
    assert!(matches!(refine, Err(ConductorError::Conflict(_))));
    assert!(matches!(
        engine.delete_project(project.id),
        Err(ConductorError::Conflict(_))
    ));
    assert!(matches!(
        engine.delete_task(task.id),
        Err(ConductorError::Conflict(_))
    ));
    assert_eq!(engine.get_task(task.id).unwrap().status, TaskStatus::InProgress);

    agent.release.notify_one();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.status, TaskStatus::Completed);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(names, vec!["task:assigned", "task:completed"]);

    // Once finished, the project can go, tasks and all.
    engine.delete_project(project.id).unwrap();
    assert!(engine.get_task(task.id).is_err());
}

#[tokio::test]
async fn test_project_delete_leaves_no_tasks_behind() {
    let engine = Orchestrator::new(&config(10), Arc::new(StaticAgentDirectory::new()));
    let project = engine.create_project("p", "d", Some("1. Plan\nthings".into())).unwrap();
    engine
        .create_task(project.id, draft("attached", Priority::Medium, vec![]))
        .unwrap();

    for _ in 0..2 {
        let err = engine.decompose_project(project.id).await.unwrap_err();
        assert!(matches!(err, ConductorError::NoAvailableAgent(_)));
    }
    assert_eq!(engine.capacity_metrics().pending_tasks, 1);

    engine.delete_project(project.id).unwrap();
    assert!(engine
        .list_tasks()
        .iter()
        .all(|t| t.project_id != project.id));
    assert_eq!(engine.capacity_metrics().pending_tasks, 0);
    assert!(engine.store().read().queue().is_empty());
}
