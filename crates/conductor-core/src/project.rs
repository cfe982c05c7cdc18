use crate::task::{Priority, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    Completed,
    Cancelled,
}

/// A requirement extracted during decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

/// A group of tasks that together close one lifecycle phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub id: Uuid,
    pub name: String,
    pub phase: TaskType,
    pub task_ids: Vec<Uuid>,
}

/// Planning metadata attached to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub last_refined: Option<DateTime<Utc>>,
}

/// A named collection of tasks derived from a planning document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Raw planning text ("PRD"), if any.
    pub prd: Option<String>,
    /// Tasks owned by this project, in attachment order.
    #[serde(default)]
    pub task_ids: Vec<Uuid>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            prd: None,
            task_ids: Vec::new(),
            milestones: Vec::new(),
            requirements: Vec::new(),
            status: ProjectStatus::Planning,
            metadata: ProjectMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_prd(mut self, prd: impl Into<String>) -> Self {
        self.prd = Some(prd.into());
        self
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields of a project that explicit update calls may change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub prd: Option<String>,
    pub status: Option<ProjectStatus>,
    pub metadata: Option<ProjectMetadata>,
}

impl ProjectPatch {
    /// Apply every present field to `project`.
    pub fn apply(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(prd) = self.prd {
            project.prd = Some(prd);
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(metadata) = self.metadata {
            project.metadata = metadata;
        }
        project.touch();
    }
}
