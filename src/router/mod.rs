//! Task-type dispatch: maps a task-type key to its behavior bundle.
//!
//! A [`RouterEntry`] is an immutable bundle of plain function pointers — no
//! reflection, no per-entry trait objects. Router tables come in generations;
//! [`TaskRouter::new`] unions them with later entries winning on key
//! collision, which models additive API versioning without duplicating
//! dispatch logic.

pub mod payload;

use std::collections::HashMap;

use futures::future::BoxFuture;
use sea_orm::DatabaseTransaction;
use serde_json::json;
use uuid::Uuid;

use crate::domain::OperationKind;
use crate::entities::operation;
use crate::errors::ServiceError;
use crate::services::{content, create};

use payload::CreateTaskPayload;

/// Result of a type-specific create function. `created` is false when the
/// external key already had an operation and the existing guid is returned.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub guids: Vec<Uuid>,
    pub created: bool,
}

pub type CreateFn = for<'a> fn(
    &'a DatabaseTransaction,
    &'a CreateTaskPayload,
    Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>>;

pub type ContentFn = for<'a> fn(
    &'a DatabaseTransaction,
    &'a operation::Model,
    serde_json::Value,
    Option<Uuid>,
) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>>;

pub type ShapeFn = fn(&operation::Model) -> serde_json::Value;

/// Behavior bundle for one task-type key.
#[derive(Clone)]
pub struct RouterEntry {
    pub kind: OperationKind,
    pub create: CreateFn,
    pub content: Option<ContentFn>,
    pub shape: ShapeFn,
    /// Take must run the collect sub-step before being accepted.
    pub composite_take: bool,
}

impl std::fmt::Debug for RouterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEntry")
            .field("kind", &self.kind)
            .field("has_content", &self.content.is_some())
            .field("composite_take", &self.composite_take)
            .finish()
    }
}

/// Registry of task-type keys, built once at startup.
#[derive(Debug, Clone)]
pub struct TaskRouter {
    entries: HashMap<String, RouterEntry>,
}

impl TaskRouter {
    /// Builds the full router: generation tables unioned in order, later
    /// entries winning on key collision.
    pub fn new() -> Self {
        Self::from_generations(vec![generation_one(), generation_two()])
    }

    pub fn from_generations(generations: Vec<Vec<(OperationKind, RouterEntry)>>) -> Self {
        let mut entries = HashMap::new();
        for table in generations {
            for (kind, entry) in table {
                entries.insert(kind.to_string(), entry);
            }
        }
        Self { entries }
    }

    /// Resolves a task-type key to its behavior bundle.
    pub fn resolve(&self, key: &str) -> Result<&RouterEntry, ServiceError> {
        self.entries
            .get(key)
            .ok_or_else(|| ServiceError::TaskTypeNotFound(key.to_string()))
    }

    pub fn known_keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

impl Default for TaskRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Default read shape: the task summary every kind exposes.
pub fn shape_default(op: &operation::Model) -> serde_json::Value {
    json!({
        "guid": op.id,
        "number": op.number,
        "type": op.kind,
        "date": op.date,
        "status": op.status,
        "closed": op.closed,
        "ready_to_unload": op.ready_to_unload,
        "unloaded": op.unloaded,
        "user": op.user_id,
    })
}

/// Extended shape for warehouse-routed kinds: adds the grouping and routing
/// fields handheld clients filter on.
pub fn shape_routed(op: &operation::Model) -> serde_json::Value {
    let mut value = shape_default(op);
    let obj = value.as_object_mut().unwrap();
    obj.insert("line".into(), json!(op.line));
    obj.insert("batch_number".into(), json!(op.batch_number));
    obj.insert("storage".into(), json!(op.storage_key));
    obj.insert("direction".into(), json!(op.direction_key));
    obj.insert("parent_task".into(), json!(op.parent_task_id));
    obj.insert("collect_kind".into(), json!(op.collect_kind));
    value
}

fn entry(
    kind: OperationKind,
    create: CreateFn,
    content: Option<ContentFn>,
    shape: ShapeFn,
    composite_take: bool,
) -> (OperationKind, RouterEntry) {
    (
        kind,
        RouterEntry {
            kind,
            create,
            content,
            shape,
            composite_take,
        },
    )
}

/// First-generation table: the marking-side and basic warehouse kinds.
pub fn generation_one() -> Vec<(OperationKind, RouterEntry)> {
    vec![
        entry(
            OperationKind::Acceptance,
            create::create_acceptance,
            Some(content::collect_content),
            shape_default,
            false,
        ),
        entry(
            OperationKind::PalletCollect,
            create::create_pallet_collect,
            Some(content::collect_content),
            shape_routed,
            true,
        ),
        entry(
            OperationKind::Placement,
            create::create_placement,
            Some(content::cells_content),
            shape_default,
            false,
        ),
        entry(
            OperationKind::Movement,
            create::create_movement,
            None,
            shape_routed,
            false,
        ),
        entry(
            OperationKind::Shipment,
            create::create_shipment,
            Some(content::collect_content),
            shape_routed,
            false,
        ),
        entry(
            OperationKind::Selection,
            create::create_selection,
            Some(content::cells_content),
            shape_routed,
            false,
        ),
        entry(
            OperationKind::Order,
            create::create_order,
            None,
            shape_routed,
            false,
        ),
        entry(
            OperationKind::Inventory,
            create::create_inventory,
            Some(content::fact_content),
            shape_default,
            false,
        ),
        entry(
            OperationKind::Repacking,
            create::create_repacking,
            None,
            shape_default,
            false,
        ),
    ]
}

/// Second-generation table: later additions, plus a richer placement shape.
/// Unioned over generation one, so its placement entry wins.
pub fn generation_two() -> Vec<(OperationKind, RouterEntry)> {
    vec![
        entry(
            OperationKind::Placement,
            create::create_placement,
            Some(content::cells_content),
            shape_routed,
            false,
        ),
        entry(
            OperationKind::ArrivalAtStock,
            create::create_arrival_at_stock,
            None,
            shape_routed,
            false,
        ),
        entry(
            OperationKind::WriteOff,
            create::create_write_off,
            Some(content::fact_content),
            shape_default,
            false,
        ),
        entry(
            OperationKind::CancelShipment,
            create::create_cancel_shipment,
            None,
            shape_routed,
            false,
        ),
        entry(
            OperationKind::MovementShipment,
            create::create_movement_shipment,
            Some(content::collect_content),
            shape_routed,
            false,
        ),
    ]
}
