use chrono::Utc;
use conductor_core::{
    ConductorError, ConductorResult, Project, ProjectPatch, Task, TaskPatch, TaskStatus,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Authoritative in-memory record of tasks and projects, plus the
/// priority-ordered pending queue.
///
/// The store is a plain structure; callers share it behind a lock and every
/// status change goes through a compare-and-set method (`claim`,
/// `mark_in_progress`, `mark_completed`, `mark_failed`) so a single lock
/// acquisition both checks and moves the state.
#[derive(Clone)]
pub struct TaskStore {
    tasks: HashMap<Uuid, Task>,
    projects: HashMap<Uuid, Project>,
    /// Task ids in scheduling order: stable-sorted by priority rank.
    queue: Vec<Uuid>,
    /// Creation order of tasks and projects.
    task_order: Vec<Uuid>,
    project_order: Vec<Uuid>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            projects: HashMap::new(),
            queue: Vec::new(),
            task_order: Vec::new(),
            project_order: Vec::new(),
        }
    }

    // --- Projects ---

    /// Add a project.
    pub fn insert_project(&mut self, project: Project) -> Uuid {
        let id = project.id;
        if self.projects.insert(id, project).is_none() {
            self.project_order.push(id);
        }
        id
    }

    pub fn project(&self, id: Uuid) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn project_mut(&mut self, id: Uuid) -> Option<&mut Project> {
        self.projects.get_mut(&id)
    }

    /// All projects in creation order.
    pub fn projects(&self) -> Vec<&Project> {
        self.project_order
            .iter()
            .filter_map(|id| self.projects.get(id))
            .collect()
    }

    pub fn update_project(&mut self, id: Uuid, patch: ProjectPatch) -> ConductorResult<Project> {
        let project = self
            .projects
            .get_mut(&id)
            .ok_or_else(|| ConductorError::project_not_found(id))?;
        patch.apply(project);
        Ok(project.clone())
    }

    /// Delete a project together with every task that belongs to it,
    /// attached or detached.
    ///
    /// Fails with `Conflict`, changing nothing, while any of those tasks is
    /// assigned or in progress.
    pub fn remove_project(&mut self, id: Uuid) -> ConductorResult<(Project, Vec<Task>)> {
        if !self.projects.contains_key(&id) {
            return Err(ConductorError::project_not_found(id));
        }
        if let Some(running) = self
            .tasks
            .values()
            .find(|t| t.project_id == id && is_running(t.status))
        {
            return Err(ConductorError::Conflict(format!(
                "project {id} has task {} in flight and cannot be deleted",
                running.id
            )));
        }
        let project = self
            .projects
            .remove(&id)
            .ok_or_else(|| ConductorError::project_not_found(id))?;
        self.project_order.retain(|p| *p != id);

        let owned: Vec<Uuid> = self
            .task_order
            .iter()
            .copied()
            .filter(|t| self.tasks.get(t).is_some_and(|task| task.project_id == id))
            .collect();
        let mut removed = Vec::with_capacity(owned.len());
        for task_id in owned {
            if let Some(task) = self.tasks.remove(&task_id) {
                removed.push(task);
            }
        }
        self.queue.retain(|q| self.tasks.contains_key(q));
        self.task_order.retain(|t| self.tasks.contains_key(t));
        Ok((project, removed))
    }

    // --- Tasks ---

    /// Validate and add a task, attaching it to its project's task list.
    ///
    /// Fails if the project is unknown, a dependency is unknown, or the
    /// dependencies would close a cycle.
    pub fn insert_task(&mut self, task: Task) -> ConductorResult<Uuid> {
        let id = self.insert_detached(task)?;
        if let Some(project_id) = self.tasks.get(&id).map(|t| t.project_id) {
            if let Some(project) = self.projects.get_mut(&project_id) {
                project.task_ids.push(id);
                project.touch();
            }
        }
        Ok(id)
    }

    /// Validate and add a task without attaching it to its project's list.
    pub fn insert_detached(&mut self, mut task: Task) -> ConductorResult<Uuid> {
        if !self.projects.contains_key(&task.project_id) {
            return Err(ConductorError::project_not_found(task.project_id));
        }
        if self.tasks.contains_key(&task.id) {
            return Err(ConductorError::Conflict(format!("task {} already exists", task.id)));
        }
        let deps = std::mem::take(&mut task.dependencies);
        task.set_dependencies(deps);
        self.validate_dependencies(task.id, &task.dependencies)?;

        let id = task.id;
        self.tasks.insert(id, task);
        self.task_order.push(id);
        Ok(id)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All tasks in creation order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.task_order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Tasks attached to a project, in attachment order.
    pub fn tasks_by_project(&self, project_id: Uuid) -> ConductorResult<Vec<&Task>> {
        let project = self
            .projects
            .get(&project_id)
            .ok_or_else(|| ConductorError::project_not_found(project_id))?;
        Ok(project
            .task_ids
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect())
    }

    /// Apply an explicit update. A priority change re-sorts the queue.
    pub fn update_task(&mut self, id: Uuid, patch: TaskPatch) -> ConductorResult<Task> {
        if !self.tasks.contains_key(&id) {
            return Err(ConductorError::task_not_found(id));
        }

        let deps = match patch.dependencies {
            Some(deps) => {
                let mut unique: Vec<Uuid> = Vec::with_capacity(deps.len());
                for dep in deps {
                    if dep != id && !unique.contains(&dep) {
                        unique.push(dep);
                    }
                }
                self.validate_dependencies(id, &unique)?;
                Some(unique)
            }
            None => None,
        };

        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(task_type) = patch.task_type {
            task.task_type = task_type;
        }
        if let Some(deps) = deps {
            task.dependencies = deps;
        }
        if let Some(metadata) = patch.metadata {
            task.metadata = metadata;
        }
        let reorder = match patch.priority {
            Some(priority) if priority != task.priority => {
                task.priority = priority;
                true
            }
            _ => false,
        };
        let updated = task.clone();

        if reorder {
            self.sort_queue();
        }
        Ok(updated)
    }

    /// Delete a task from every index. Dependents are left untouched and
    /// stay pending until their dependency list is changed.
    /// Assigned and in-progress tasks are refused with `Conflict`.
    pub fn remove_task(&mut self, id: Uuid) -> ConductorResult<Task> {
        let status = self
            .tasks
            .get(&id)
            .map(|t| t.status)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        if is_running(status) {
            return Err(ConductorError::Conflict(format!(
                "task {id} is in flight and cannot be deleted"
            )));
        }
        let task = self
            .tasks
            .remove(&id)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        self.queue.retain(|q| *q != id);
        self.task_order.retain(|t| *t != id);
        if let Some(project) = self.projects.get_mut(&task.project_id) {
            project.task_ids.retain(|t| *t != id);
            project.touch();
        }
        Ok(task)
    }

    // --- Queue ---

    /// Make a task eligible for scheduling. Enqueuing twice is a no-op.
    pub fn enqueue(&mut self, id: Uuid) -> ConductorResult<()> {
        if !self.tasks.contains_key(&id) {
            return Err(ConductorError::task_not_found(id));
        }
        if !self.queue.contains(&id) {
            self.queue.push(id);
            self.sort_queue();
        }
        Ok(())
    }

    /// Stable sort: equal priorities keep insertion order.
    fn sort_queue(&mut self) {
        let tasks = &self.tasks;
        self.queue
            .sort_by_key(|id| tasks.get(id).map(|t| t.priority.rank()).unwrap_or(u8::MAX));
    }

    /// Queued task ids in scheduling order.
    pub fn queue(&self) -> &[Uuid] {
        &self.queue
    }

    /// Queued tasks that are pending with every dependency completed, in
    /// queue order. A dependency on a missing task is never satisfied.
    pub fn eligible(&self) -> Vec<&Task> {
        self.queue
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.is_ready(|dep| self.is_completed(dep)))
            .collect()
    }

    fn is_completed(&self, id: &Uuid) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|t| t.status == TaskStatus::Completed)
    }

    // --- Status transitions ---

    /// Atomically move a pending task with completed dependencies to
    /// `assigned`, record the agent and start time, and dequeue it.
    pub fn claim(&mut self, id: Uuid, agent_id: &str) -> ConductorResult<Task> {
        let task = self
            .tasks
            .get(&id)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        if task.status != TaskStatus::Pending {
            return Err(ConductorError::Conflict(format!(
                "task {id} is {}, not pending",
                task.status
            )));
        }
        if let Some(dep) = task.dependencies.iter().find(|d| !self.is_completed(d)) {
            return Err(ConductorError::Conflict(format!(
                "task {id} depends on {dep}, which is not completed"
            )));
        }

        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        task.status = TaskStatus::Assigned;
        task.assigned_agent = Some(agent_id.to_string());
        task.started_at = Some(Utc::now());
        let claimed = task.clone();
        self.queue.retain(|q| *q != id);
        Ok(claimed)
    }

    /// `assigned -> in_progress`.
    pub fn mark_in_progress(&mut self, id: Uuid) -> ConductorResult<Task> {
        self.transition(id, TaskStatus::InProgress, |_| {})
    }

    /// `in_progress -> completed`, storing output and duration.
    pub fn mark_completed(
        &mut self,
        id: Uuid,
        output: String,
        duration_ms: u64,
    ) -> ConductorResult<Task> {
        self.transition(id, TaskStatus::Completed, |task| {
            task.output = Some(output);
            task.duration_ms = Some(duration_ms);
            task.completed_at = Some(Utc::now());
        })
    }

    /// `in_progress -> failed`, storing the error.
    pub fn mark_failed(&mut self, id: Uuid, error: String) -> ConductorResult<Task> {
        self.transition(id, TaskStatus::Failed, |task| {
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
        })
    }

    fn transition(
        &mut self,
        id: Uuid,
        next: TaskStatus,
        apply: impl FnOnce(&mut Task),
    ) -> ConductorResult<Task> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ConductorError::task_not_found(id))?;
        if !task.status.can_transition_to(next) {
            return Err(ConductorError::Conflict(format!(
                "task {id} cannot move from {} to {next}",
                task.status
            )));
        }
        task.status = next;
        apply(task);
        Ok(task.clone())
    }

    // --- Counts ---

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn pending_count(&self) -> usize {
        self.count_status(TaskStatus::Pending)
    }

    pub fn count_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    // --- Dependency graph ---

    fn validate_dependencies(&self, id: Uuid, deps: &[Uuid]) -> ConductorResult<()> {
        if let Some(missing) = deps.iter().find(|d| !self.tasks.contains_key(d)) {
            return Err(ConductorError::Validation(format!(
                "dependency {missing} does not exist"
            )));
        }
        if self.would_cycle(id, deps) {
            return Err(ConductorError::Validation(format!(
                "dependencies of task {id} would create a cycle"
            )));
        }
        Ok(())
    }

    /// Whether giving `id` the dependency list `deps` closes a cycle.
    pub fn would_cycle(&self, id: Uuid, deps: &[Uuid]) -> bool {
        let mut seen = HashSet::new();
        let mut stack: Vec<Uuid> = deps.to_vec();
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                stack.extend(task.dependencies.iter().copied());
            }
        }
        false
    }

    /// Check the whole dependency graph for cycles.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        for &id in self.tasks.keys() {
            if self.dfs_cycle(id, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, id: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,  // back edge
            Some(2) => return false, // done
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.tasks.get(&id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_running(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Assigned | TaskStatus::InProgress)
}
