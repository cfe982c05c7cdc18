//! Applying decomposition results and refinement diffs to a project.
//!
//! Both operations run against a scratch copy of the store that replaces
//! the live one only when every step succeeded.

use crate::store::TaskStore;
use chrono::Utc;
use conductor_core::{
    ConductorError, ConductorResult, Milestone, Project, ProjectStatus, Requirement, Task,
    TaskDraft, TaskPatch, TaskStatus, TaskType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `task_id` depends on `depends_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub task_id: Uuid,
    pub depends_on: Uuid,
}

/// A patch for one existing task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub id: Uuid,
    #[serde(flatten)]
    pub patch: TaskPatch,
}

/// Externally supplied changes to a project's task graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementDiff {
    #[serde(default)]
    pub added_tasks: Vec<TaskDraft>,
    #[serde(default)]
    pub removed_task_ids: Vec<Uuid>,
    #[serde(default)]
    pub updated_tasks: Vec<TaskUpdate>,
    #[serde(default)]
    pub added_dependencies: Vec<DependencyEdge>,
    #[serde(default)]
    pub removed_dependencies: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementReport {
    pub project: Project,
    pub added: Vec<Task>,
    pub removed: Vec<Uuid>,
    pub updated: Vec<Uuid>,
}

/// Replace a project's tasks with freshly parsed drafts.
///
/// Superseded tasks still `pending` are deleted; superseded tasks in any
/// other state stay in the store but are detached from the project. The
/// new tasks are attached and enqueued, requirements and milestones are
/// rebuilt, and the project becomes `active`.
pub fn apply_decomposition(
    store: &mut TaskStore,
    project_id: Uuid,
    drafts: Vec<TaskDraft>,
) -> ConductorResult<(Project, Vec<Task>)> {
    let mut scratch = store.clone();

    let superseded = scratch
        .project(project_id)
        .ok_or_else(|| ConductorError::project_not_found(project_id))?
        .task_ids
        .clone();
    for id in superseded {
        let pending = scratch
            .task(id)
            .is_some_and(|t| t.status == TaskStatus::Pending);
        if pending {
            scratch.remove_task(id)?;
        }
    }
    if let Some(project) = scratch.project_mut(project_id) {
        project.task_ids.clear();
    }

    let created = insert_drafts(&mut scratch, project_id, drafts)?;
    rebuild_structure(&mut scratch, project_id)?;

    let project = scratch
        .project_mut(project_id)
        .ok_or_else(|| ConductorError::project_not_found(project_id))?;
    project.status = ProjectStatus::Active;
    project.metadata.last_refined = Some(Utc::now());
    project.touch();
    let project = project.clone();

    *store = scratch;
    Ok((project, created))
}

/// Apply a refinement diff. Nothing changes if any step fails.
///
/// Order: removals, patches, additions, removed edges, added edges. Every
/// referenced existing task must belong to the project.
pub fn apply_refinement(
    store: &mut TaskStore,
    project_id: Uuid,
    diff: RefinementDiff,
) -> ConductorResult<RefinementReport> {
    let mut scratch = store.clone();
    let owned = scratch
        .project(project_id)
        .ok_or_else(|| ConductorError::project_not_found(project_id))?
        .task_ids
        .clone();
    let check_owned = |id: Uuid| {
        if owned.contains(&id) {
            Ok(())
        } else {
            Err(ConductorError::Validation(format!(
                "task {id} does not belong to project {project_id}"
            )))
        }
    };

    for id in &diff.removed_task_ids {
        check_owned(*id)?;
        scratch.remove_task(*id)?;
    }

    let mut updated = Vec::new();
    for update in diff.updated_tasks {
        check_owned(update.id)?;
        scratch.update_task(update.id, update.patch)?;
        updated.push(update.id);
    }

    let added = insert_drafts(&mut scratch, project_id, diff.added_tasks)?;

    for edge in diff.removed_dependencies {
        check_owned(edge.task_id)?;
        let deps = current_dependencies(&scratch, edge.task_id)?
            .into_iter()
            .filter(|d| *d != edge.depends_on)
            .collect();
        set_dependencies(&mut scratch, edge.task_id, deps)?;
        updated.push(edge.task_id);
    }

    for edge in diff.added_dependencies {
        if !owned.contains(&edge.task_id) && !added.iter().any(|t| t.id == edge.task_id) {
            check_owned(edge.task_id)?;
        }
        if edge.task_id == edge.depends_on {
            return Err(ConductorError::Validation(format!(
                "task {} cannot depend on itself",
                edge.task_id
            )));
        }
        let mut deps = current_dependencies(&scratch, edge.task_id)?;
        deps.push(edge.depends_on);
        set_dependencies(&mut scratch, edge.task_id, deps)?;
        updated.push(edge.task_id);
    }

    rebuild_structure(&mut scratch, project_id)?;
    let project = scratch
        .project_mut(project_id)
        .ok_or_else(|| ConductorError::project_not_found(project_id))?;
    project.metadata.last_refined = Some(Utc::now());
    project.touch();
    let project = project.clone();

    updated.sort();
    updated.dedup();
    *store = scratch;
    Ok(RefinementReport {
        project,
        added,
        removed: diff.removed_task_ids,
        updated,
    })
}

fn insert_drafts(
    store: &mut TaskStore,
    project_id: Uuid,
    drafts: Vec<TaskDraft>,
) -> ConductorResult<Vec<Task>> {
    let mut created = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let id = store.insert_task(draft.into_task(project_id))?;
        store.enqueue(id)?;
        if let Some(task) = store.task(id) {
            created.push(task.clone());
        }
    }
    Ok(created)
}

fn current_dependencies(store: &TaskStore, id: Uuid) -> ConductorResult<Vec<Uuid>> {
    store
        .task(id)
        .map(|t| t.dependencies.clone())
        .ok_or_else(|| ConductorError::task_not_found(id))
}

fn set_dependencies(store: &mut TaskStore, id: Uuid, deps: Vec<Uuid>) -> ConductorResult<()> {
    store.update_task(
        id,
        TaskPatch {
            dependencies: Some(deps),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Rebuild requirements from `requirement` tasks and one milestone per
/// task-type phase present, in lifecycle order.
fn rebuild_structure(store: &mut TaskStore, project_id: Uuid) -> ConductorResult<()> {
    let tasks: Vec<Task> = store
        .tasks_by_project(project_id)?
        .into_iter()
        .cloned()
        .collect();

    let requirements = tasks
        .iter()
        .filter(|t| t.task_type == TaskType::Requirement)
        .map(|t| Requirement {
            id: t.id,
            title: t.title.clone(),
            description: t.description.clone(),
            priority: t.priority,
        })
        .collect();

    let milestones = TaskType::ALL
        .into_iter()
        .filter_map(|phase| {
            let task_ids: Vec<Uuid> = tasks
                .iter()
                .filter(|t| t.task_type == phase)
                .map(|t| t.id)
                .collect();
            (!task_ids.is_empty()).then(|| Milestone {
                id: Uuid::new_v4(),
                name: milestone_name(phase),
                phase,
                task_ids,
            })
        })
        .collect();

    if let Some(project) = store.project_mut(project_id) {
        project.requirements = requirements;
        project.milestones = milestones;
    }
    Ok(())
}

fn milestone_name(phase: TaskType) -> String {
    let word = phase.as_str();
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => format!("{}{} complete", first.to_ascii_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
