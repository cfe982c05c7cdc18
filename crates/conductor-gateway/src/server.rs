use crate::middleware::request_log_middleware;
use crate::preview::{DecompositionPreviewer, ParserPreviewer};
use crate::{capacity, events, projects, tasks};
use axum::middleware as axum_mw;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use conductor_orchestrator::Orchestrator;
use std::sync::Arc;
use tower::ServiceBuilder;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub previewer: Arc<dyn DecompositionPreviewer>,
}

/// The HTTP API server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router with the parser-backed decomposition preview.
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        Self::build_with_previewer(orchestrator, Arc::new(ParserPreviewer))
    }

    /// Build the router with a custom decomposition previewer.
    pub fn build_with_previewer(
        orchestrator: Arc<Orchestrator>,
        previewer: Arc<dyn DecompositionPreviewer>,
    ) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            previewer,
        });

        Router::new()
            .route("/health", get(health_handler))
            .route(
                "/projects",
                get(projects::list_projects).post(projects::create_project),
            )
            .route(
                "/projects/{id}",
                get(projects::get_project)
                    .put(projects::update_project)
                    .delete(projects::delete_project),
            )
            .route("/projects/{id}/tasks", get(projects::project_tasks))
            .route("/projects/{id}/decompose", post(projects::decompose))
            .route(
                "/projects/{id}/decompose/preview",
                post(projects::preview_decomposition),
            )
            .route("/projects/{id}/decompose/refine", post(projects::refine))
            .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
            .route(
                "/tasks/{id}",
                get(tasks::get_task)
                    .put(tasks::update_task)
                    .delete(tasks::delete_task),
            )
            .route("/tasks/{id}/dispatch", post(tasks::dispatch_task))
            .route("/capacity/metrics", get(capacity::metrics))
            .route(
                "/capacity/agents/{id}",
                get(capacity::get_agent).put(capacity::put_agent),
            )
            .route("/capacity/recommendations", get(capacity::recommendations))
            .route("/capacity/rebalance", post(capacity::rebalance))
            .route("/capacity/ceiling", put(capacity::put_ceiling))
            .route("/events", get(events::events_handler))
            .layer(ServiceBuilder::new().layer(axum_mw::from_fn(request_log_middleware)))
            .with_state(state)
    }
}

async fn health_handler() -> impl IntoResponse {
    serde_json::json!({"status": "ok", "service": "conductor"}).to_string()
}
