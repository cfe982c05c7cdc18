use crate::agent::Agent;
use async_trait::async_trait;
use conductor_core::{ConductorResult, Task, TaskType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A candidate agent for a task together with its match score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAgent {
    pub agent_id: String,
    pub score: f64,
}

/// Public description of a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: String,
    /// Task types this agent accepts. Empty means any type.
    #[serde(default)]
    pub capabilities: Vec<TaskType>,
    /// Free-form skill tags matched against a task's `requiredSkills`.
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl AgentProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            skills: Vec::new(),
            available: true,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<TaskType>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    /// Match score for `task`, or `None` if this agent cannot take it.
    ///
    /// A declared capability match scores 1.0, a generalist 0.5, and each
    /// required skill the agent has adds 0.25.
    pub fn score_for(&self, task: &Task) -> Option<f64> {
        let base = if self.capabilities.is_empty() {
            0.5
        } else if self.capabilities.contains(&task.task_type) {
            1.0
        } else {
            return None;
        };

        let skill_bonus = required_skills(task)
            .iter()
            .filter(|wanted| self.skills.iter().any(|s| s.eq_ignore_ascii_case(wanted)))
            .count() as f64
            * 0.25;

        Some(base + skill_bonus)
    }
}

/// Skills listed in a task's `requiredSkills` metadata entry.
fn required_skills(task: &Task) -> Vec<String> {
    match task.metadata.get("requiredSkills") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// External collaborator that locates and ranks agents.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Candidates for `task`, best first. Empty when nobody can take it.
    async fn ranked_agents_for(&self, task: &Task) -> ConductorResult<Vec<RankedAgent>>;

    /// Agents currently accepting work.
    async fn available_agents(&self) -> ConductorResult<Vec<AgentProfile>>;

    /// Handle used to invoke the agent with the given id.
    fn agent(&self, id: &str) -> Option<Arc<dyn Agent>>;
}

struct Entry {
    profile: AgentProfile,
    agent: Arc<dyn Agent>,
}

/// In-process directory over a fixed set of registered agents.
///
/// Ranking is by [`AgentProfile::score_for`]; ties keep registration order.
pub struct StaticAgentDirectory {
    entries: RwLock<Vec<Entry>>,
}

impl std::fmt::Debug for StaticAgentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAgentDirectory").finish_non_exhaustive()
    }
}

impl StaticAgentDirectory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register an agent, replacing any earlier registration with the same id.
    pub fn register(&self, profile: AgentProfile, agent: Arc<dyn Agent>) {
        let mut entries = self.entries.write();
        entries.retain(|e| e.profile.id != profile.id);
        info!(agent_id = %profile.id, capabilities = ?profile.capabilities, "Registered agent");
        entries.push(Entry { profile, agent });
    }

    /// Remove an agent. Returns `false` if it was not registered.
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.profile.id != id);
        entries.len() != before
    }

    /// Toggle whether an agent accepts work. Returns `false` for unknown ids.
    pub fn set_available(&self, id: &str, available: bool) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.profile.id == id) {
            Some(entry) => {
                entry.profile.available = available;
                true
            }
            None => false,
        }
    }

    /// Every registered profile, available or not.
    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.entries.read().iter().map(|e| e.profile.clone()).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for StaticAgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn ranked_agents_for(&self, task: &Task) -> ConductorResult<Vec<RankedAgent>> {
        let entries = self.entries.read();
        let mut ranked: Vec<RankedAgent> = entries
            .iter()
            .filter(|e| e.profile.available)
            .filter_map(|e| {
                e.profile.score_for(task).map(|score| RankedAgent {
                    agent_id: e.profile.id.clone(),
                    score,
                })
            })
            .collect();
        // sort_by is stable, so equal scores keep registration order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    async fn available_agents(&self) -> ConductorResult<Vec<AgentProfile>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.profile.available)
            .map(|e| e.profile.clone())
            .collect())
    }

    fn agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.profile.id == id)
            .map(|e| Arc::clone(&e.agent))
    }
}
