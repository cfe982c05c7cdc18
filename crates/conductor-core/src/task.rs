use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Requirement,
    Design,
    #[default]
    Implementation,
    Test,
    Deployment,
    Review,
}

impl TaskType {
    /// All task types in project lifecycle order.
    pub const ALL: [TaskType; 6] = [
        TaskType::Requirement,
        TaskType::Design,
        TaskType::Implementation,
        TaskType::Test,
        TaskType::Deployment,
        TaskType::Review,
    ];

    /// Case-insensitive keyword lookup. Returns `None` for unknown keywords.
    pub fn from_keyword(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
    }

    /// Lowercase keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Requirement => "requirement",
            TaskType::Design => "design",
            TaskType::Implementation => "implementation",
            TaskType::Test => "test",
            TaskType::Deployment => "deployment",
            TaskType::Review => "review",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority. Lower rank is scheduled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// All priorities, highest first.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Queue rank: `critical=0 < high=1 < medium=2 < low=3`.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// Case-insensitive keyword lookup. Returns `None` for unknown keywords.
    pub fn from_keyword(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
    }

    /// Lowercase keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `pending -> assigned -> in_progress -> completed | failed`. There is no
/// transition back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Assigned)
                | (TaskStatus::Assigned, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }

    /// Completed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A unit of work owned by a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Ids of tasks that must be completed first. Unique, never `self.id`.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(project_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            task_type: TaskType::default(),
            title: title.into(),
            description: description.into(),
            priority: Priority::default(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            assigned_agent: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            duration_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set dependencies, dropping duplicates and self-references.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.set_dependencies(deps);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replace the dependency set, keeping first occurrence order.
    pub fn set_dependencies(&mut self, deps: Vec<Uuid>) {
        let mut unique = Vec::with_capacity(deps.len());
        for dep in deps {
            if dep != self.id && !unique.contains(&dep) {
                unique.push(dep);
            }
        }
        self.dependencies = unique;
    }

    /// Pending and every dependency is in `completed`.
    pub fn is_ready(&self, is_completed: impl Fn(&Uuid) -> bool) -> bool {
        self.status == TaskStatus::Pending && self.dependencies.iter().all(is_completed)
    }
}

/// Fields of a task that explicit update calls may change.
///
/// Status is deliberately absent: it only moves through dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub priority: Option<Priority>,
    pub dependencies: Option<Vec<Uuid>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// A task description before it is stored, as produced by the
/// decomposition parser or supplied by API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskDraft {
    /// Materialise the draft as a pending task of `project_id`.
    pub fn into_task(self, project_id: Uuid) -> Task {
        let mut task = Task::new(project_id, self.title, self.description)
            .with_type(self.task_type)
            .with_priority(self.priority)
            .with_dependencies(self.dependencies);
        task.metadata = self.metadata;
        task
    }
}
