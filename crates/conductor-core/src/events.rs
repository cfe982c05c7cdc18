//! Typed engine events and the in-process bus that fans them out.
//!
//! Notification, webhook and logging collaborators subscribe to the bus; the
//! engine never calls them directly for announcements.

use crate::project::Project;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// An announcement emitted by the engine.
///
/// Serialized with an `event` tag carrying the wire name (`task:created`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    #[serde(rename = "task:created")]
    TaskCreated { task: Box<Task> },

    #[serde(rename = "task:assigned")]
    TaskAssigned { task_id: Uuid, agent_id: String },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: Uuid,
        agent_id: String,
        output: String,
        duration_ms: u64,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        task_id: Uuid,
        agent_id: String,
        error: String,
    },

    #[serde(rename = "task:error")]
    TaskError {
        task_id: Uuid,
        agent_id: String,
        error: String,
    },

    #[serde(rename = "project:created")]
    ProjectCreated { project: Box<Project> },
}

impl EngineEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TaskCreated { .. } => "task:created",
            EngineEvent::TaskAssigned { .. } => "task:assigned",
            EngineEvent::TaskCompleted { .. } => "task:completed",
            EngineEvent::TaskFailed { .. } => "task:failed",
            EngineEvent::TaskError { .. } => "task:error",
            EngineEvent::ProjectCreated { .. } => "project:created",
        }
    }

    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            EngineEvent::TaskCreated { task } => Some(task.id),
            EngineEvent::TaskAssigned { task_id, .. }
            | EngineEvent::TaskCompleted { task_id, .. }
            | EngineEvent::TaskFailed { task_id, .. }
            | EngineEvent::TaskError { task_id, .. } => Some(*task_id),
            EngineEvent::ProjectCreated { .. } => None,
        }
    }
}

/// Broadcast bus for [`EngineEvent`]s.
///
/// Publishing never blocks and never fails; slow subscribers lag and lose
/// the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announce an event to all current subscribers.
    pub fn publish(&self, event: EngineEvent) {
        let name = event.name();
        // An error only means nobody is listening.
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "Event published with no subscribers");
        }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
