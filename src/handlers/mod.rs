//! HTTP surface: thin axum handlers delegating to the services.

pub mod exchange;
pub mod health;
pub mod pallets;
pub mod tasks;

use std::sync::Arc;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::services::{exchange::ExchangeService, pallets::PalletService, tasks::TaskService};

/// Service set shared through the application state.
#[derive(Clone)]
pub struct AppServices {
    pub tasks: Arc<TaskService>,
    pub pallets: Arc<PalletService>,
    pub exchange: Arc<ExchangeService>,
}

/// Caller principal from the `X-User-Id` header. Session management lives in
/// front of this service; an absent or malformed header means anonymous.
pub fn caller_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
