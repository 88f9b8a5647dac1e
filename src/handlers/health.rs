use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct ComponentHealth {
    status: &'static str,
    message: String,
}

/// GET /health — liveness plus a database ping.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let backend = state.db.get_database_backend();
    let database = match state
        .db
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
    {
        Ok(_) => ComponentHealth {
            status: "up",
            message: "connected".to_string(),
        },
        Err(e) => ComponentHealth {
            status: "down",
            message: e.to_string(),
        },
    };

    let status = if database.status == "up" { "up" } else { "degraded" };

    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "details": { "database": database },
    }))
}
