use async_trait::async_trait;
use conductor_core::{ConductorResult, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Work order sent to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub task_id: Uuid,
    /// The task description, used verbatim as the work prompt.
    pub prompt: String,
    /// The task metadata.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub priority: Priority,
}

/// What an agent reports back after executing a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Execution time in milliseconds as measured by the agent.
    #[serde(rename = "duration", default)]
    pub duration_ms: u64,
}

impl AgentResponse {
    pub fn success(result: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// An external worker that can execute one task.
///
/// `Err` means the invocation itself broke (transport failure, crash); a
/// task the agent attempted and could not finish is `Ok` with
/// `success == false`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier of this agent.
    fn id(&self) -> &str;

    /// Execute one request to completion.
    async fn execute(&self, request: AgentRequest) -> ConductorResult<AgentResponse>;
}
