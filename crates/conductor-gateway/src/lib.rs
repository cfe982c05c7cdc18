//! HTTP API for the conductor engine.
//!
//! [`GatewayServer::build`] returns an axum [`Router`](axum::Router) exposing
//! project and task CRUD, decomposition, capacity management and a
//! WebSocket stream of engine events at `/events`. Engine errors render as
//! `{"error", "kind"}` bodies with the status code of their kind.

pub mod capacity;
pub mod error;
pub mod events;
pub mod middleware;
pub mod preview;
pub mod projects;
pub mod server;
pub mod tasks;

pub use error::{ApiError, ApiResult};
pub use preview::{DecompositionPreviewer, ParserPreviewer};
pub use server::{AppState, GatewayServer};
