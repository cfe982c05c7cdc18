//! Agent-side contracts for Conductor.
//!
//! An [`Agent`] executes one task; an [`AgentDirectory`] ranks which agent
//! should take a task and hands out agent handles. [`StaticAgentDirectory`]
//! and [`HttpAgent`] are the in-tree implementations wired by the CLI.

/// The agent contract and its request/response shapes.
pub mod agent;
/// Building directories from configuration.
pub mod config;
/// The directory contract and the capability-ranking static directory.
pub mod directory;
/// HTTP agent client.
pub mod http;

pub use agent::{Agent, AgentRequest, AgentResponse};
pub use config::{build_directory, AgentEndpointConfig};
pub use directory::{AgentDirectory, AgentProfile, RankedAgent, StaticAgentDirectory};
pub use http::HttpAgent;
