//! Task routes.

use crate::error::ApiResult;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use conductor_core::{TaskDraft, TaskPatch, TaskStatus};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Body of `POST /tasks`: a task draft plus its owning project.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub project_id: Uuid,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

/// Optional filters for `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

pub(crate) async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let task = state.orchestrator.create_task(req.project_id, req.draft)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub(crate) async fn list_tasks(
    State(state): State<Arc<AppState>>,
    filter: Result<Query<TaskFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(filter) = filter?;
    let tasks = match filter.project_id {
        Some(project_id) => state.orchestrator.tasks_by_project(project_id)?,
        None => state.orchestrator.list_tasks(),
    };
    let tasks: Vec<_> = tasks
        .into_iter()
        .filter(|t| filter.status.map_or(true, |s| t.status == s))
        .collect();
    Ok(Json(tasks))
}

pub(crate) async fn get_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.get_task(id)?))
}

pub(crate) async fn update_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.orchestrator.update_task(id, patch)?))
}

pub(crate) async fn delete_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    state.orchestrator.delete_task(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dispatches immediately. Waits for the agent and returns the outcome.
pub(crate) async fn dispatch_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.dispatch_task(id).await?))
}
