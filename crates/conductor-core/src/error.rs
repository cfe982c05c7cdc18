use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Top-level error type for the Conductor engine.
///
/// Each variant is one distinguishable failure case. Callers classify a
/// failure through [`ConductorError::kind`], never by inspecting the message.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// An unknown project, task or agent id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The agent directory returned no candidate for a task.
    #[error("No available agent: {0}")]
    NoAvailableAgent(String),

    /// Malformed or inconsistent input (unknown dependency, cycle, bad field).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The agent reported failure or its invocation raised an error.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The entity is not in a state that allows the requested transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The concurrency ceiling is already reached.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tag identifying the class of a [`ConductorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NoAvailableAgent,
    Validation,
    Execution,
    Conflict,
    CapacityExhausted,
    Config,
    Internal,
}

impl ErrorKind {
    /// HTTP status code the API boundary should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::CapacityExhausted => 429,
            ErrorKind::Execution => 502,
            ErrorKind::NoAvailableAgent => 503,
            ErrorKind::Config | ErrorKind::Internal => 500,
        }
    }

    /// Stable lowercase name, used in API error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoAvailableAgent => "no_available_agent",
            ErrorKind::Validation => "validation",
            ErrorKind::Execution => "execution",
            ErrorKind::Conflict => "conflict",
            ErrorKind::CapacityExhausted => "capacity_exhausted",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConductorError {
    /// The tagged kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConductorError::NotFound(_) => ErrorKind::NotFound,
            ConductorError::NoAvailableAgent(_) => ErrorKind::NoAvailableAgent,
            ConductorError::Validation(_) | ConductorError::Json(_) => ErrorKind::Validation,
            ConductorError::Execution(_) | ConductorError::Http(_) => ErrorKind::Execution,
            ConductorError::Conflict(_) => ErrorKind::Conflict,
            ConductorError::CapacityExhausted(_) => ErrorKind::CapacityExhausted,
            ConductorError::Config(_) => ErrorKind::Config,
            ConductorError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a task lookup miss.
    pub fn task_not_found(id: impl std::fmt::Display) -> Self {
        ConductorError::NotFound(format!("task {id}"))
    }

    /// Shorthand for a project lookup miss.
    pub fn project_not_found(id: impl std::fmt::Display) -> Self {
        ConductorError::NotFound(format!("project {id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ConductorError::task_not_found("t1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ConductorError::NoAvailableAgent("x".into()).kind(),
            ErrorKind::NoAvailableAgent
        );
        assert_eq!(
            ConductorError::Http("boom".into()).kind(),
            ErrorKind::Execution
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::NoAvailableAgent.status_code(), 503);
        assert_eq!(ErrorKind::Internal.status_code(), 500);
    }

    #[test]
    fn test_message_does_not_drive_kind() {
        // A message mentioning "not found" is still an execution failure.
        let err = ConductorError::Execution("agent said: file not found".into());
        assert_eq!(err.kind(), ErrorKind::Execution);
    }
}
