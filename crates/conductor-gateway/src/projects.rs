//! Project routes, including decomposition, preview and refinement.

use crate::error::ApiResult;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use conductor_core::ProjectPatch;
use conductor_orchestrator::RefinementDiff;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Body of `POST /projects`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prd: Option<String>,
}

pub(crate) async fn create_project(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let project = state
        .orchestrator
        .create_project(req.name, req.description, req.prd)?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub(crate) async fn list_projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.list_projects())
}

pub(crate) async fn get_project(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.get_project(id)?))
}

pub(crate) async fn update_project(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ProjectPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.orchestrator.update_project(id, patch)?))
}

pub(crate) async fn delete_project(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    state.orchestrator.delete_project(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn project_tasks(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.tasks_by_project(id)?))
}

/// Runs decomposition through an agent and persists the resulting tasks.
pub(crate) async fn decompose(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.decompose_project(id).await?))
}

pub(crate) async fn preview_decomposition(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let project = state.orchestrator.get_project(id)?;
    let tasks = state.previewer.preview(&project).await?;
    Ok(Json(serde_json::json!({
        "projectId": project.id,
        "tasks": tasks,
    })))
}

pub(crate) async fn refine(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RefinementDiff>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let Json(diff) = body?;
    Ok(Json(state.orchestrator.refine_project(id, diff)?))
}
