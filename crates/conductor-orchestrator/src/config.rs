use conductor_core::{ConductorError, ConductorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the environment variable overriding the concurrency ceiling.
pub const MAX_CONCURRENT_TASKS_ENV: &str = "MAX_CONCURRENT_TASKS";

/// `[orchestrator]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Run a scheduling pass as soon as any dispatch finishes.
    #[serde(default)]
    pub wake_on_completion: bool,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_tick_interval_secs() -> u64 {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            tick_interval_secs: default_tick_interval_secs(),
            wake_on_completion: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Apply a `MAX_CONCURRENT_TASKS` value, if one was supplied.
    pub fn with_ceiling_override(mut self, raw: Option<&str>) -> ConductorResult<Self> {
        if let Some(raw) = raw {
            self.max_concurrent_tasks = raw.trim().parse().map_err(|_| {
                ConductorError::Config(format!(
                    "{MAX_CONCURRENT_TASKS_ENV} must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> ConductorResult<()> {
        if self.tick_interval_secs == 0 {
            return Err(ConductorError::Config(
                "tick_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
