//! Shared test harness: an application state backed by a file-based SQLite
//! database (one connection, schema built from the entities).
#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use wareflow_api::{
    config::AppConfig,
    db,
    domain::ExchangeGrouping,
    entities::{app_user, product, shift, storage, storage_cell},
    AppState,
};

pub struct TestApp {
    pub state: AppState,
    _tmp: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_grouping(ExchangeGrouping::Line).await
    }

    pub async fn with_grouping(grouping: ExchangeGrouping) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let db_file = tmp.path().join("wareflow_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.exchange_grouping = grouping;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let state = AppState::new(Arc::new(pool), cfg, None);
        Self { state, _tmp: tmp }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub async fn seed_user(&self, username: &str) -> app_user::Model {
        app_user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            role: Set(Some("operator".to_string())),
        }
        .insert(self.db())
        .await
        .expect("failed to seed user")
    }

    pub async fn seed_product(&self, key: &str) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_key: Set(key.to_string()),
            name: Set(format!("Product {key}")),
            gtin: Set(None),
        }
        .insert(self.db())
        .await
        .expect("failed to seed product")
    }

    pub async fn seed_storage(&self, key: &str) -> storage::Model {
        storage::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_key: Set(key.to_string()),
            name: Set(format!("Storage {key}")),
        }
        .insert(self.db())
        .await
        .expect("failed to seed storage")
    }

    pub async fn seed_cell(&self, key: &str, needs_task_filter: bool) -> storage_cell::Model {
        storage_cell::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_key: Set(key.to_string()),
            storage_id: Set(None),
            name: Set(format!("Cell {key}")),
            needs_task_filter: Set(needs_task_filter),
        }
        .insert(self.db())
        .await
        .expect("failed to seed cell")
    }

    pub async fn seed_shift(&self, key: &str, closed: bool) -> shift::Model {
        shift::ActiveModel {
            id: Set(Uuid::new_v4()),
            external_key: Set(key.to_string()),
            line: Set(Some("LINE-1".to_string())),
            closed: Set(closed),
            opened_at: Set(Utc::now()),
            closed_at: Set(None),
        }
        .insert(self.db())
        .await
        .expect("failed to seed shift")
    }
}

/// Acceptance payload matching the create shape: an upstream document with
/// pallets and expected product lines.
pub fn acceptance_payload(external_key: &str, storage: &str, pallet_codes: &[&str]) -> Value {
    let pallets: Vec<Value> = pallet_codes
        .iter()
        .map(|code| {
            json!({
                "code": code,
                "content_count": 10,
                "weight": "50.0",
                "batch_number": "B-100",
            })
        })
        .collect();

    json!({
        "external_key": external_key,
        "name": "acceptance document",
        "storage": storage,
        "line": "LINE-1",
        "batch_number": "B-100",
        "pallets": pallets,
        "products": [{ "external_key": format!("{external_key}-P1"), "product": "P1", "count": 5 }],
    })
}

pub fn pallet_collect_payload(
    external_key: &str,
    shift: &str,
    collect_kind: &str,
    parent_task: Option<Uuid>,
) -> Value {
    let mut payload = json!({
        "external_key": external_key,
        "name": "collect document",
        "shift": shift,
        "collect_kind": collect_kind,
        "line": "LINE-1",
    });
    if let Some(parent) = parent_task {
        payload["parent_task"] = json!(parent);
    }
    payload
}
