//! Core types and error definitions for the Conductor orchestration engine.
//!
//! This crate provides the records shared across all Conductor crates:
//! tasks, projects, the tagged error type, and engine events.
//!
//! # Main types
//!
//! - [`ConductorError`]: Unified error enum, classified by [`ErrorKind`].
//! - [`ConductorResult`]: Convenience alias for `Result<T, ConductorError>`.
//! - [`Task`]: A unit of work with a type, priority, status and dependency set.
//! - [`Project`]: A named collection of tasks, requirements and milestones.
//! - [`EngineEvent`] / [`EventBus`]: Typed announcements and their broadcast bus.

/// Error type and HTTP-mapping hint.
pub mod error;
/// Engine events and the event bus.
pub mod events;
/// Project records.
pub mod project;
/// Task records and their state machine.
pub mod task;

pub use error::{ConductorError, ConductorResult, ErrorKind};
pub use events::{EngineEvent, EventBus};
pub use project::{Milestone, Project, ProjectMetadata, ProjectPatch, ProjectStatus, Requirement};
pub use task::{Priority, Task, TaskDraft, TaskPatch, TaskStatus, TaskType};
