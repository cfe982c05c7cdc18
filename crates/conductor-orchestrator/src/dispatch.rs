use crate::hooks::{Hooks, Notification};
use crate::monitor::InFlightTracker;
use crate::store::TaskStore;
use conductor_agent::{AgentDirectory, AgentRequest};
use conductor_core::{ConductorError, ConductorResult, EngineEvent, EventBus, TaskStatus};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of one dispatch that reached the agent and got an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub task_id: Uuid,
    pub agent_id: String,
    /// `completed` or `failed`.
    pub status: TaskStatus,
    pub duration_ms: u64,
}

/// Executes one task against one agent and reconciles the outcome.
pub struct Dispatcher {
    store: Arc<RwLock<TaskStore>>,
    directory: Arc<dyn AgentDirectory>,
    in_flight: Arc<InFlightTracker>,
    ceiling: Arc<AtomicUsize>,
    hooks: Hooks,
    events: EventBus,
    wake: Option<Arc<Notify>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<RwLock<TaskStore>>,
        directory: Arc<dyn AgentDirectory>,
        ceiling: Arc<AtomicUsize>,
        hooks: Hooks,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            directory,
            in_flight: Arc::new(InFlightTracker::new()),
            ceiling,
            hooks,
            events,
            wake: None,
        }
    }

    /// Signal `wake` whenever a dispatch finishes.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn directory(&self) -> &Arc<dyn AgentDirectory> {
        &self.directory
    }

    pub fn in_flight(&self) -> &Arc<InFlightTracker> {
        &self.in_flight
    }

    pub fn store(&self) -> &Arc<RwLock<TaskStore>> {
        &self.store
    }

    /// Current concurrency ceiling.
    pub fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::SeqCst)
    }

    /// Run `task_id` on the best-ranked agent.
    ///
    /// Errors before the agent call (`NotFound`, `NoAvailableAgent`,
    /// `CapacityExhausted`, `Conflict`) leave the task untouched. An agent
    /// that answers with `success = false` yields `Ok` with a `failed`
    /// outcome; an agent call that errors marks the task failed and returns
    /// `Execution`.
    pub async fn dispatch(&self, task_id: Uuid) -> ConductorResult<DispatchOutcome> {
        let task = self
            .store
            .read()
            .task(task_id)
            .cloned()
            .ok_or_else(|| ConductorError::task_not_found(task_id))?;

        let ranked = self.directory.ranked_agents_for(&task).await?;
        let Some(top) = ranked.first() else {
            warn!(task_id = %task_id, "No agent available for task");
            return Err(ConductorError::NoAvailableAgent(format!(
                "no agent can take task {task_id}"
            )));
        };
        let agent_id = top.agent_id.clone();
        let agent = self.directory.agent(&agent_id).ok_or_else(|| {
            ConductorError::NoAvailableAgent(format!("agent '{agent_id}' is not reachable"))
        })?;

        let guard = self
            .in_flight
            .try_register(task_id, &agent_id, self.ceiling())?;
        let claimed = self.store.write().claim(task_id, &agent_id);
        let task = claimed?;

        info!(task_id = %task_id, agent_id = %agent_id, title = %task.title, "Task assigned");
        self.events.publish(EngineEvent::TaskAssigned {
            task_id,
            agent_id: agent_id.clone(),
        });
        let started = self.store.write().mark_in_progress(task_id);
        started?;

        let request = AgentRequest {
            task_id,
            prompt: task.description.clone(),
            context: task.metadata.clone(),
            priority: task.priority,
        };
        let clock = Instant::now();
        let result = agent.execute(request).await;
        let measured_ms = clock.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(response) if response.success => {
                let duration_ms = if response.duration_ms > 0 {
                    response.duration_ms
                } else {
                    measured_ms
                };
                let output = response.result.unwrap_or_default();
                let completed = self
                    .store
                    .write()
                    .mark_completed(task_id, output.clone(), duration_ms);
                let completed = completed?;
                info!(task_id = %task_id, agent_id = %agent_id, duration_ms, "Task completed");

                if let Err(e) = self.hooks.git.commit_task(&completed).await {
                    warn!(task_id = %task_id, error = %e, "Auto-commit failed");
                }
                self.events.publish(EngineEvent::TaskCompleted {
                    task_id,
                    agent_id: agent_id.clone(),
                    output,
                    duration_ms,
                });
                let note = Notification::task_completed(&completed);
                if let Err(e) = self.hooks.notifier.notify(&note).await {
                    warn!(task_id = %task_id, error = %e, "Completion notification failed");
                }

                Ok(DispatchOutcome {
                    task_id,
                    agent_id,
                    status: TaskStatus::Completed,
                    duration_ms,
                })
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "agent reported failure".to_string());
                let failed = self.store.write().mark_failed(task_id, message.clone());
                let failed = failed?;
                warn!(task_id = %task_id, agent_id = %agent_id, error = %message, "Task failed");

                self.events.publish(EngineEvent::TaskFailed {
                    task_id,
                    agent_id: agent_id.clone(),
                    error: message.clone(),
                });
                let note = Notification::task_failed(&failed, &message);
                if let Err(e) = self.hooks.notifier.notify(&note).await {
                    warn!(task_id = %task_id, error = %e, "Failure notification failed");
                }

                Ok(DispatchOutcome {
                    task_id,
                    agent_id,
                    status: TaskStatus::Failed,
                    duration_ms: measured_ms,
                })
            }
            Err(e) => {
                let message = e.to_string();
                let failed = self.store.write().mark_failed(task_id, message.clone());
                if let Err(store_err) = failed {
                    error!(task_id = %task_id, error = %store_err, "Could not record agent error");
                }
                error!(task_id = %task_id, agent_id = %agent_id, error = %message, "Agent call errored");

                self.events.publish(EngineEvent::TaskError {
                    task_id,
                    agent_id: agent_id.clone(),
                    error: message.clone(),
                });
                Err(ConductorError::Execution(format!(
                    "agent '{agent_id}' failed on task {task_id}: {message}"
                )))
            }
        };

        drop(guard);
        if let Some(wake) = &self.wake {
            wake.notify_one();
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hooks::{GitCommitter, Notifier};
    use async_trait::async_trait;
    use conductor_agent::{Agent, AgentProfile, AgentResponse, StaticAgentDirectory};
    use conductor_core::{Project, Task};
    use std::sync::atomic::AtomicBool;

    enum Script {
        Succeed(&'static str),
        Fail(&'static str),
        Error(&'static str),
    }

    struct ScriptedAgent {
        id: String,
        script: Script,
        saw_in_flight: Arc<AtomicBool>,
        tracker: parking_lot::Mutex<Option<Arc<InFlightTracker>>>,
    }

    impl ScriptedAgent {
        fn new(id: &str, script: Script) -> Self {
            Self {
                id: id.into(),
                script,
                saw_in_flight: Arc::new(AtomicBool::new(false)),
                tracker: parking_lot::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn id(&self) -> &str {
            &self.id
        }

        async fn execute(&self, request: AgentRequest) -> ConductorResult<AgentResponse> {
            if let Some(tracker) = self.tracker.lock().as_ref() {
                self.saw_in_flight
                    .store(tracker.contains(request.task_id), Ordering::SeqCst);
            }
            match self.script {
                Script::Succeed(out) => Ok(AgentResponse::success(out, 25)),
                Script::Fail(err) => Ok(AgentResponse::failure(err, 5)),
                Script::Error(err) => Err(ConductorError::Http(err.into())),
            }
        }
    }

    struct BrokenGit;

    #[async_trait]
    impl GitCommitter for BrokenGit {
        async fn commit_task(&self, _task: &Task) -> ConductorResult<()> {
            Err(ConductorError::Execution("not a git repository".into()))
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn notify(&self, _n: &Notification) -> ConductorResult<()> {
            Err(ConductorError::Http("smtp down".into()))
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        task_id: Uuid,
        events: EventBus,
    }

    fn fixture(agent: Option<ScriptedAgent>, hooks: Hooks, ceiling: usize) -> Fixture {
        let store = Arc::new(RwLock::new(TaskStore::new()));
        let task_id = {
            let mut s = store.write();
            let pid = s.insert_project(Project::new("p", "d"));
            let id = s.insert_task(Task::new(pid, "Write docs", "Document the API")).unwrap();
            s.enqueue(id).unwrap();
            id
        };
        let directory = Arc::new(StaticAgentDirectory::new());
        let events = EventBus::new(16);
        let dispatcher = Dispatcher::new(
            store,
            directory.clone(),
            Arc::new(AtomicUsize::new(ceiling)),
            hooks,
            events.clone(),
        );
        if let Some(agent) = agent {
            *agent.tracker.lock() = Some(Arc::clone(dispatcher.in_flight()));
            directory.register(AgentProfile::new(agent.id.clone()), Arc::new(agent));
        }
        Fixture {
            dispatcher,
            task_id,
            events,
        }
    }

    fn status(f: &Fixture) -> TaskStatus {
        f.dispatcher.store().read().task(f.task_id).unwrap().status
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let f = fixture(None, Hooks::default(), 10);
        let err = f.dispatcher.dispatch(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ConductorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_no_agent_leaves_task_pending() {
        let f = fixture(None, Hooks::default(), 10);
        let err = f.dispatcher.dispatch(f.task_id).await.unwrap_err();
        assert!(matches!(err, ConductorError::NoAvailableAgent(_)));
        assert_eq!(status(&f), TaskStatus::Pending);
        assert!(f.dispatcher.in_flight().is_empty());
        assert_eq!(f.dispatcher.store().read().queue(), &[f.task_id]);
    }

    #[tokio::test]
    async fn test_success_path() {
        let agent = ScriptedAgent::new("writer", Script::Succeed("docs written"));
        let saw = Arc::clone(&agent.saw_in_flight);
        let f = fixture(Some(agent), Hooks::default(), 10);
        let mut rx = f.events.subscribe();

        let outcome = f.dispatcher.dispatch(f.task_id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(outcome.agent_id, "writer");
        assert_eq!(outcome.duration_ms, 25);
        assert!(saw.load(Ordering::SeqCst), "task was in flight during the call");
        assert!(f.dispatcher.in_flight().is_empty());

        let task = f.dispatcher.store().read().task(f.task_id).cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output.as_deref(), Some("docs written"));
        assert_eq!(task.assigned_agent.as_deref(), Some("writer"));

        assert_eq!(rx.recv().await.unwrap().name(), "task:assigned");
        assert_eq!(rx.recv().await.unwrap().name(), "task:completed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broken_hooks_do_not_change_outcome() {
        let hooks = Hooks {
            git: Arc::new(BrokenGit),
            notifier: Arc::new(BrokenNotifier),
        };
        let f = fixture(Some(ScriptedAgent::new("a", Script::Succeed("ok"))), hooks, 10);
        let outcome = f.dispatcher.dispatch(f.task_id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Completed);
        assert_eq!(status(&f), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_reported_failure() {
        let f = fixture(
            Some(ScriptedAgent::new("a", Script::Fail("tests red"))),
            Hooks::default(),
            10,
        );
        let mut rx = f.events.subscribe();
        let outcome = f.dispatcher.dispatch(f.task_id).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Failed);

        let task = f.dispatcher.store().read().task(f.task_id).cloned().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("tests red"));
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().name(), "task:failed");
    }

    #[tokio::test]
    async fn test_agent_error_propagates() {
        let f = fixture(
            Some(ScriptedAgent::new("a", Script::Error("connection reset"))),
            Hooks::default(),
            10,
        );
        let mut rx = f.events.subscribe();
        let err = f.dispatcher.dispatch(f.task_id).await.unwrap_err();
        assert!(matches!(err, ConductorError::Execution(_)));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(status(&f), TaskStatus::Failed);
        assert!(f.dispatcher.in_flight().is_empty());
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().name(), "task:error");
    }

    #[tokio::test]
    async fn test_second_dispatch_conflicts() {
        let f = fixture(
            Some(ScriptedAgent::new("a", Script::Succeed("ok"))),
            Hooks::default(),
            10,
        );
        f.dispatcher.dispatch(f.task_id).await.unwrap();
        let err = f.dispatcher.dispatch(f.task_id).await.unwrap_err();
        assert!(matches!(err, ConductorError::Conflict(_)));
        assert_eq!(status(&f), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_zero_ceiling_blocks_manual_dispatch() {
        let f = fixture(
            Some(ScriptedAgent::new("a", Script::Succeed("ok"))),
            Hooks::default(),
            0,
        );
        let err = f.dispatcher.dispatch(f.task_id).await.unwrap_err();
        assert!(matches!(err, ConductorError::CapacityExhausted(_)));
        assert_eq!(status(&f), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_wake_is_signalled() {
        let wake = Arc::new(Notify::new());
        let f = fixture(
            Some(ScriptedAgent::new("a", Script::Succeed("ok"))),
            Hooks::default(),
            10,
        );
        let dispatcher = f.dispatcher.with_wake(Arc::clone(&wake));
        dispatcher.dispatch(f.task_id).await.unwrap();
        // notify_one stores a permit when nobody is waiting.
        tokio::time::timeout(std::time::Duration::from_millis(100), wake.notified())
            .await
            .unwrap();
    }
}
