use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// One task currently being executed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightEntry {
    pub task_id: Uuid,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
}

/// Tracks tasks in flight and enforces the concurrency ceiling.
///
/// Registration checks the ceiling and inserts under one lock, so two
/// dispatchers can never both take the last slot.
pub struct InFlightTracker {
    entries: Mutex<HashMap<Uuid, InFlightEntry>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a slot for `task_id`.
    ///
    /// Fails with `Conflict` if the task is already in flight and with
    /// `CapacityExhausted` if `ceiling` slots are taken. The slot is released
    /// when the returned guard is dropped.
    pub fn try_register(
        self: &Arc<Self>,
        task_id: Uuid,
        agent_id: &str,
        ceiling: usize,
    ) -> ConductorResult<InFlightGuard> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&task_id) {
            return Err(ConductorError::Conflict(format!(
                "task {task_id} is already in flight"
            )));
        }
        if entries.len() >= ceiling {
            return Err(ConductorError::CapacityExhausted(format!(
                "{} of {ceiling} slots in use",
                entries.len()
            )));
        }
        entries.insert(
            task_id,
            InFlightEntry {
                task_id,
                agent_id: agent_id.to_string(),
                started_at: Utc::now(),
            },
        );
        Ok(InFlightGuard {
            tracker: Arc::clone(self),
            task_id,
        })
    }

    fn release(&self, task_id: Uuid) {
        self.entries.lock().remove(&task_id);
    }

    /// Number of tasks in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.entries.lock().contains_key(&task_id)
    }

    /// Current in-flight entries, oldest first.
    pub fn snapshot(&self) -> Vec<InFlightEntry> {
        let mut entries: Vec<InFlightEntry> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.started_at);
        entries
    }

    /// In-flight count per agent id.
    pub fn per_agent(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.lock().values() {
            *counts.entry(entry.agent_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its in-flight slot on drop.
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
    task_id: Uuid,
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

impl InFlightGuard {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.release(self.task_id);
    }
}
