//! Wareflow API Library
//!
//! Factory/warehouse execution core: marking and warehouse operations routed
//! as typed tasks through a dispatch registry, pallet/source accounting, and
//! an exchange batch gate for external-system export.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod router;
pub mod services;

use std::sync::Arc;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use handlers::AppServices;
use services::{exchange::ExchangeService, pallets::PalletService, tasks::TaskService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: AppServices,
}

impl AppState {
    /// Wires the service set from a connection, configuration and optional
    /// event sender. The router registry is built once here.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let task_router = Arc::new(router::TaskRouter::new());
        let exchange = ExchangeService::new(
            db.clone(),
            config.exchange_grouping,
            event_sender.clone(),
        );
        let services = AppServices {
            tasks: Arc::new(TaskService::new(
                db.clone(),
                task_router,
                exchange.clone(),
                event_sender.clone(),
            )),
            pallets: Arc::new(PalletService::new(db.clone(), event_sender.clone())),
            exchange: Arc::new(exchange),
        };

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Assembles the application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/tasks", handlers::tasks::routes())
        .nest("/api/v1/pallets", handlers::pallets::routes())
        .nest("/api/v1/exchange", handlers::exchange::routes())
        .merge(handlers::health::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
