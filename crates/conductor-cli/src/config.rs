//! `conductor.toml` loading.

use anyhow::Context;
use conductor_agent::AgentEndpointConfig;
use conductor_orchestrator::{
    CommandGitCommitter, Hooks, OrchestratorConfig, WebhookNotifier, MAX_CONCURRENT_TASKS_ENV,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "conductor.toml";

#[derive(Debug, Default, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub agents: Vec<AgentEndpointConfig>,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Auto-commit after each completed task.
#[derive(Debug, Deserialize)]
pub struct GitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_repo_path")]
    pub repo_path: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_path: default_repo_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

impl ConductorConfig {
    /// Parse and validate a config document.
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: ConductorConfig = toml::from_str(raw)?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Load `path`. A missing file at the default path yields defaults; a
    /// missing file anywhere else is an error.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_toml(&raw)
                .with_context(|| format!("Invalid config file '{}'", path.display())),
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    && path == Path::new(DEFAULT_CONFIG_PATH) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    /// Apply the `MAX_CONCURRENT_TASKS` override, given its raw value.
    pub fn with_env_override(mut self, raw: Option<&str>) -> anyhow::Result<Self> {
        self.orchestrator = self
            .orchestrator
            .with_ceiling_override(raw)
            .with_context(|| format!("Invalid {MAX_CONCURRENT_TASKS_ENV}"))?;
        Ok(self)
    }

    /// Side-effect collaborators selected by the `[git]` and
    /// `[notifications]` sections.
    pub fn hooks(&self) -> Hooks {
        let mut hooks = Hooks::default();
        if self.git.enabled {
            hooks.git = Arc::new(CommandGitCommitter::new(self.git.repo_path.clone()));
        }
        if let Some(url) = &self.notifications.webhook_url {
            hooks.notifier = Arc::new(WebhookNotifier::new(url.clone()));
        }
        hooks
    }
}
