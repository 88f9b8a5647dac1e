use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::caller_from_headers;
use crate::router::payload::PropertiesPatch;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:kind", get(list_tasks).post(create_task))
        .route("/:kind/:guid/take", post(take_task))
        .route("/:kind/:guid", patch(change_properties))
        .route("/:kind/:guid/content", post(change_content))
}

/// GET /tasks/:kind — query-string filters, default visibility per caller.
async fn list_tasks(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers);
    let tasks = state
        .services
        .tasks
        .list_tasks(&kind, &filters, caller)
        .await?;
    Ok(Json(json!({ "tasks": tasks })))
}

/// POST /tasks/:kind — idempotent create per external key.
async fn create_task(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers);
    let guids = state.services.tasks.create_task(&kind, payload, caller).await?;
    Ok(Json(json!({ "guids": guids })))
}

/// POST /tasks/:kind/:guid/take — claim ownership, NEW -> WORK.
async fn take_task(
    State(state): State<AppState>,
    Path((kind, guid)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers).ok_or_else(|| {
        ServiceError::validation("taking a task requires an identified caller")
    })?;
    let shaped = state.services.tasks.take_task(&kind, guid, caller).await?;
    Ok(Json(shaped))
}

/// PATCH /tasks/:kind/:guid — partial properties update.
async fn change_properties(
    State(state): State<AppState>,
    Path((kind, guid)): Path<(String, Uuid)>,
    Json(patch): Json<PropertiesPatch>,
) -> Result<Json<Value>, ServiceError> {
    let shaped = state
        .services
        .tasks
        .change_task_properties(&kind, guid, patch)
        .await?;
    Ok(Json(shaped))
}

/// POST /tasks/:kind/:guid/content — type-specific content change.
async fn change_content(
    State(state): State<AppState>,
    Path((kind, guid)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers);
    let result = state
        .services
        .tasks
        .change_task_content(&kind, guid, payload, caller)
        .await?;
    Ok(Json(result))
}
