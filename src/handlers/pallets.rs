use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::OperationKind;
use crate::errors::ServiceError;
use crate::handlers::caller_from_headers;
use crate::router::payload::PalletItem;
use crate::services::pallets::DividePalletSpec;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_pallets))
        .route("/:code/divide", post(divide_pallet))
}

#[derive(Debug, Deserialize)]
struct CreatePalletsRequest {
    pallets: Vec<PalletItem>,
}

#[derive(Debug, Deserialize)]
struct DividePalletRequest {
    task_type: OperationKind,
    code: Option<String>,
    count: i32,
    weight: Option<Decimal>,
    pallet_type: Option<String>,
}

/// POST /pallets — upsert-by-code batch create, result in input order.
async fn create_pallets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePalletsRequest>,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers);
    let pallets = state
        .services
        .pallets
        .create_pallets(request.pallets, caller)
        .await?;
    Ok(Json(json!({ "pallets": pallets })))
}

/// POST /pallets/:code/divide — split a pallet, branching by task type.
async fn divide_pallet(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DividePalletRequest>,
) -> Result<Json<Value>, ServiceError> {
    let caller = caller_from_headers(&headers);
    let spec = DividePalletSpec {
        code: request.code,
        count: request.count,
        weight: request.weight,
        pallet_type: request.pallet_type,
    };
    let pallets = state
        .services
        .pallets
        .divide_pallet(&code, spec, caller, request.task_type)
        .await?;
    Ok(Json(json!({ "pallets": pallets })))
}
