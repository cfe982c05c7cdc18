//! Capacity reporting and planning.
//!
//! The concurrency ceiling is the only hard limit the engine enforces.
//! Per-agent limits recorded here are advisory: they feed recommendations
//! and rebalance plans but never block a dispatch.

use chrono::{DateTime, Utc};
use conductor_core::{ConductorError, ConductorResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time view of engine load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityMetrics {
    pub max_concurrent_tasks: usize,
    pub in_flight: usize,
    pub available_slots: usize,
    /// `in_flight / max_concurrent_tasks`, 1.0 when the ceiling is zero.
    pub utilization: f64,
    pub pending_tasks: usize,
    pub eligible_tasks: usize,
    pub in_flight_by_agent: HashMap<String, usize>,
}

impl CapacityMetrics {
    pub fn new(
        max_concurrent_tasks: usize,
        in_flight: usize,
        pending_tasks: usize,
        eligible_tasks: usize,
        in_flight_by_agent: HashMap<String, usize>,
    ) -> Self {
        let utilization = if max_concurrent_tasks == 0 {
            1.0
        } else {
            in_flight as f64 / max_concurrent_tasks as f64
        };
        Self {
            max_concurrent_tasks,
            in_flight,
            available_slots: max_concurrent_tasks.saturating_sub(in_flight),
            utilization,
            pending_tasks,
            eligible_tasks,
            in_flight_by_agent,
        }
    }
}

/// Advisory concurrency limit for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapacity {
    pub agent_id: String,
    pub max_concurrent: usize,
}

/// Per-agent capacity records.
pub struct CapacityRegistry {
    agents: RwLock<HashMap<String, AgentCapacity>>,
}

impl CapacityRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentCapacity> {
        self.agents.read().get(agent_id).cloned()
    }

    /// Insert or replace the record for `agent_id`.
    pub fn put(&self, agent_id: &str, max_concurrent: usize) -> ConductorResult<AgentCapacity> {
        if agent_id.trim().is_empty() {
            return Err(ConductorError::Validation("agent id must not be empty".into()));
        }
        let record = AgentCapacity {
            agent_id: agent_id.to_string(),
            max_concurrent,
        };
        self.agents
            .write()
            .insert(agent_id.to_string(), record.clone());
        Ok(record)
    }

    /// All records sorted by agent id.
    pub fn list(&self) -> Vec<AgentCapacity> {
        let mut all: Vec<AgentCapacity> = self.agents.read().values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }
}

impl Default for CapacityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    RaiseCeiling,
    AgentOverLimit,
    IdleCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<usize>,
}

/// An agent running more tasks than its advisory limit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverage {
    pub agent_id: String,
    pub in_flight: usize,
    pub max_concurrent: usize,
}

/// What a rebalance would change. In-flight work is never interrupted;
/// over-limit agents simply should not receive new work until they drain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlan {
    pub generated_at: DateTime<Utc>,
    pub over_limit: Vec<AgentOverage>,
    pub recommendations: Vec<Recommendation>,
}

/// Strategy turning capacity metrics into advice.
pub trait CapacityPlanner: Send + Sync {
    fn recommend(&self, metrics: &CapacityMetrics, agents: &[AgentCapacity])
        -> Vec<Recommendation>;

    fn rebalance(&self, metrics: &CapacityMetrics, agents: &[AgentCapacity]) -> RebalancePlan {
        RebalancePlan {
            generated_at: Utc::now(),
            over_limit: over_limit(metrics, agents),
            recommendations: self.recommend(metrics, agents),
        }
    }
}

fn over_limit(metrics: &CapacityMetrics, agents: &[AgentCapacity]) -> Vec<AgentOverage> {
    agents
        .iter()
        .filter_map(|a| {
            let running = metrics.in_flight_by_agent.get(&a.agent_id).copied()?;
            (running > a.max_concurrent).then(|| AgentOverage {
                agent_id: a.agent_id.clone(),
                in_flight: running,
                max_concurrent: a.max_concurrent,
            })
        })
        .collect()
}

/// Threshold rules over utilisation and backlog.
#[derive(Debug, Clone)]
pub struct ThresholdPlanner {
    /// Utilisation at or above which the pool counts as saturated.
    pub saturation: f64,
    /// Utilisation below which spare capacity is reported.
    pub idle: f64,
}

impl Default for ThresholdPlanner {
    fn default() -> Self {
        Self {
            saturation: 0.9,
            idle: 0.25,
        }
    }
}

impl CapacityPlanner for ThresholdPlanner {
    fn recommend(
        &self,
        metrics: &CapacityMetrics,
        agents: &[AgentCapacity],
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();

        let backlog = metrics.eligible_tasks;
        if metrics.utilization >= self.saturation && backlog > 0 {
            let suggested = metrics.max_concurrent_tasks + backlog;
            out.push(Recommendation {
                kind: RecommendationKind::RaiseCeiling,
                message: format!(
                    "{} of {} slots busy with {backlog} eligible task(s) waiting",
                    metrics.in_flight, metrics.max_concurrent_tasks
                ),
                agent_id: None,
                suggested_value: Some(suggested),
            });
        }

        for overage in over_limit(metrics, agents) {
            out.push(Recommendation {
                kind: RecommendationKind::AgentOverLimit,
                message: format!(
                    "agent '{}' runs {} task(s), advisory limit is {}",
                    overage.agent_id, overage.in_flight, overage.max_concurrent
                ),
                agent_id: Some(overage.agent_id),
                suggested_value: Some(overage.max_concurrent),
            });
        }

        if metrics.max_concurrent_tasks > 0 && metrics.utilization < self.idle && backlog == 0 {
            out.push(Recommendation {
                kind: RecommendationKind::IdleCapacity,
                message: format!(
                    "{} of {} slots free and no eligible backlog",
                    metrics.available_slots, metrics.max_concurrent_tasks
                ),
                agent_id: None,
                suggested_value: None,
            });
        }

        out
    }
}
