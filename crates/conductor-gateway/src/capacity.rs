//! Capacity routes.

use crate::error::ApiResult;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapacityRequest {
    pub max_concurrent: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CeilingRequest {
    pub max_concurrent_tasks: usize,
}

pub(crate) async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.capacity_metrics())
}

pub(crate) async fn get_agent(
    State(state): State<Arc<AppState>>,
    agent_id: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(agent_id) = agent_id?;
    Ok(Json(state.orchestrator.agent_capacity(&agent_id)?))
}

pub(crate) async fn put_agent(
    State(state): State<Arc<AppState>>,
    agent_id: Result<Path<String>, PathRejection>,
    body: Result<Json<AgentCapacityRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(agent_id) = agent_id?;
    let Json(req) = body?;
    Ok(Json(
        state
            .orchestrator
            .set_agent_capacity(&agent_id, req.max_concurrent)?,
    ))
}

pub(crate) async fn recommendations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.capacity_recommendations())
}

pub(crate) async fn rebalance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.rebalance())
}

/// Changes the global ceiling. In-flight work is never interrupted.
pub(crate) async fn put_ceiling(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CeilingRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    state
        .orchestrator
        .set_max_concurrent_tasks(req.max_concurrent_tasks);
    Ok(Json(state.orchestrator.capacity_metrics()))
}
