use crate::agent::{Agent, AgentRequest, AgentResponse};
use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult};
use std::time::Duration;
use tracing::{debug, warn};

/// Agent reached over HTTP.
///
/// Each request is POSTed as JSON to `endpoint`; the body of a 2xx answer
/// must be an [`AgentResponse`]. Any other status is an invocation error.
pub struct HttpAgent {
    id: String,
    endpoint: String,
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpAgent {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            timeout: None,
        }
    }

    /// Bound every call. Without this, a call runs until the agent answers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Agent for HttpAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, request: AgentRequest) -> ConductorResult<AgentResponse> {
        debug!(agent_id = %self.id, task_id = %request.task_id, "Sending task to HTTP agent");

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            ConductorError::Http(format!("agent '{}' unreachable: {e}", self.id))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(agent_id = %self.id, status = %status, "HTTP agent returned error status");
            return Err(ConductorError::Http(format!(
                "agent '{}' returned {status}: {}",
                self.id,
                body.chars().take(500).collect::<String>()
            )));
        }

        response.json::<AgentResponse>().await.map_err(|e| {
            ConductorError::Http(format!("agent '{}' sent an invalid response: {e}", self.id))
        })
    }
}
