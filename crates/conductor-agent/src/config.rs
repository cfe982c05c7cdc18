use crate::directory::{AgentDirectory as _, AgentProfile, StaticAgentDirectory};
use crate::http::HttpAgent;
use conductor_core::{ConductorError, ConductorResult, TaskType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One `[[agents]]` entry of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpointConfig {
    pub id: String,
    /// URL the HTTP agent listens on.
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<TaskType>,
    #[serde(default)]
    pub skills: Vec<String>,
    /// Per-call timeout. Absent means calls are unbounded.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl AgentEndpointConfig {
    fn validate(&self) -> ConductorResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConductorError::Config("agent id must not be empty".into()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConductorError::Config(format!(
                "agent '{}' endpoint must be an http(s) URL, got '{}'",
                self.id, self.endpoint
            )));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConductorError::Config(format!(
                "agent '{}' timeout_secs must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

/// Build a directory of HTTP agents from configuration entries.
pub fn build_directory(configs: &[AgentEndpointConfig]) -> ConductorResult<StaticAgentDirectory> {
    let directory = StaticAgentDirectory::new();
    for config in configs {
        config.validate()?;
        if directory.agent(&config.id).is_some() {
            return Err(ConductorError::Config(format!(
                "duplicate agent id '{}'",
                config.id
            )));
        }

        let mut agent = HttpAgent::new(&config.id, &config.endpoint);
        if let Some(secs) = config.timeout_secs {
            agent = agent.with_timeout(Duration::from_secs(secs));
        }

        let profile = AgentProfile::new(&config.id)
            .with_capabilities(config.capabilities.clone())
            .with_skills(config.skills.clone());
        directory.register(profile, Arc::new(agent));
    }
    Ok(directory)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn entry(id: &str, endpoint: &str) -> AgentEndpointConfig {
        AgentEndpointConfig {
            id: id.into(),
            endpoint: endpoint.into(),
            capabilities: vec![],
            skills: vec![],
            timeout_secs: None,
        }
    }

    #[test]
    fn test_build_directory() {
        let directory = build_directory(&[
            entry("a", "http://localhost:9001/run"),
            entry("b", "https://agents.internal/b"),
        ])
        .unwrap();
        assert_eq!(directory.agent_count(), 2);
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = build_directory(&[entry("a", "ftp://nope")]).unwrap_err();
        assert!(matches!(err, ConductorError::Config(_)));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = build_directory(&[
            entry("a", "http://localhost:1"),
            entry("a", "http://localhost:2"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_entry_deserialization() {
        let parsed: AgentEndpointConfig = serde_json::from_str(
            r#"{"id":"tester","endpoint":"http://x","capabilities":["test","review"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.capabilities, vec![TaskType::Test, TaskType::Review]);
        assert!(parsed.timeout_secs.is_none());
    }
}
