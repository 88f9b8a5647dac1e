use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::exchange::register_day_for_exchange;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/confirm", post(confirm_unloading))
        .route("/register-day", post(register_day))
}

#[derive(Debug, Deserialize)]
struct ConfirmUnloadingRequest {
    guids: Vec<Uuid>,
}

/// POST /exchange/confirm — the external system acknowledges consumption.
async fn confirm_unloading(
    State(state): State<AppState>,
    Json(request): Json<ConfirmUnloadingRequest>,
) -> Result<Json<Value>, ServiceError> {
    state
        .services
        .exchange
        .confirm_unloading(&request.guids)
        .await?;
    Ok(Json(json!({ "confirmed": request.guids.len() })))
}

/// POST /exchange/register-day — manual catch-up sweep over the current day.
/// The synchronous per-close trigger is the canonical gate entry point.
async fn register_day(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    let groups = register_day_for_exchange(&state.services.exchange, &state.db).await?;
    Ok(Json(json!({ "groups_granted": groups })))
}
