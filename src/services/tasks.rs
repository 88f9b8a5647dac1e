//! Generic task lifecycle engine over the router: list, create, take,
//! property patches and content changes, each a single transaction.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::domain::{OperationKind, OperationStatus, PalletStatus};
use crate::entities::{operation, operation_pallet, pallet};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::router::payload::{ContentPayload, CreateTaskPayload, PropertiesPatch};
use crate::router::{RouterEntry, TaskRouter};
use crate::services::closing::close_operation;
use crate::services::exchange::ExchangeService;

/// Task engine: resolves the behavior bundle and runs the generic lifecycle
/// operations around it.
#[derive(Clone)]
pub struct TaskService {
    db_pool: Arc<DbPool>,
    router: Arc<TaskRouter>,
    exchange: ExchangeService,
    event_sender: Option<Arc<EventSender>>,
}

impl TaskService {
    pub fn new(
        db_pool: Arc<DbPool>,
        router: Arc<TaskRouter>,
        exchange: ExchangeService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            router,
            exchange,
            event_sender,
        }
    }

    pub fn router(&self) -> &TaskRouter {
        &self.router
    }

    /// Lists tasks of a kind, shaped per the router entry.
    ///
    /// Filter keys are restricted to the filterable columns plus the
    /// synthetic `not_closed`/`only_close`; anything else is rejected. When
    /// neither synthetic filter is present the default visibility rule
    /// applies: rows owned by the caller, or unassigned NEW work.
    #[instrument(skip(self, filters), fields(kind = kind_key))]
    pub async fn list_tasks(
        &self,
        kind_key: &str,
        filters: &HashMap<String, String>,
        caller: Option<Uuid>,
    ) -> Result<Vec<Value>, ServiceError> {
        let entry = self.router.resolve(kind_key)?;

        let mut condition = Condition::all().add(operation::Column::Kind.eq(kind_key));
        let mut synthetic_given = false;

        for (key, value) in filters {
            match key.as_str() {
                "not_closed" => {
                    synthetic_given = true;
                    if parse_bool(key, value)? {
                        condition = condition.add(
                            Condition::all()
                                .add(
                                    operation::Column::Status
                                        .eq(OperationStatus::Close.to_string()),
                                )
                                .add(operation::Column::Closed.eq(true))
                                .not(),
                        );
                    }
                }
                "only_close" => {
                    synthetic_given = true;
                    if parse_bool(key, value)? {
                        condition = condition
                            .add(operation::Column::Status.eq(OperationStatus::Close.to_string()))
                            .add(operation::Column::Closed.eq(true));
                    }
                }
                "guid" => condition = condition.add(operation::Column::Id.eq(parse_uuid(key, value)?)),
                "number" => {
                    let number: i64 = value
                        .parse()
                        .map_err(|_| ServiceError::InvalidFilter(key.clone()))?;
                    condition = condition.add(operation::Column::Number.eq(number));
                }
                "status" => condition = condition.add(operation::Column::Status.eq(value.clone())),
                "closed" => {
                    condition = condition.add(operation::Column::Closed.eq(parse_bool(key, value)?))
                }
                "ready_to_unload" => {
                    condition = condition
                        .add(operation::Column::ReadyToUnload.eq(parse_bool(key, value)?))
                }
                "unloaded" => {
                    condition =
                        condition.add(operation::Column::Unloaded.eq(parse_bool(key, value)?))
                }
                "user" => {
                    condition = condition.add(operation::Column::UserId.eq(parse_uuid(key, value)?))
                }
                "line" => condition = condition.add(operation::Column::Line.eq(value.clone())),
                "batch_number" => {
                    condition = condition.add(operation::Column::BatchNumber.eq(value.clone()))
                }
                "storage" => {
                    condition = condition.add(operation::Column::StorageKey.eq(value.clone()))
                }
                "direction" => {
                    condition = condition.add(operation::Column::DirectionKey.eq(value.clone()))
                }
                other => return Err(ServiceError::InvalidFilter(other.to_string())),
            }
        }

        if !synthetic_given {
            let visibility = match caller {
                Some(user) => Condition::any()
                    .add(operation::Column::UserId.eq(user))
                    .add(operation::Column::Status.eq(OperationStatus::New.to_string())),
                None => Condition::any()
                    .add(operation::Column::Status.eq(OperationStatus::New.to_string())),
            };
            condition = condition.add(visibility);
        }

        let rows = operation::Entity::find()
            .filter(condition)
            .order_by_asc(operation::Column::Number)
            .all(&*self.db_pool)
            .await?;

        Ok(rows.iter().map(entry.shape).collect())
    }

    /// Creates a task through the kind's create function, one transaction.
    /// Idempotent per external key: resubmission returns the existing guids.
    #[instrument(skip(self, payload), fields(kind = kind_key))]
    pub async fn create_task(
        &self,
        kind_key: &str,
        payload: Value,
        caller: Option<Uuid>,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let entry = self.router.resolve(kind_key)?;
        let payload: CreateTaskPayload =
            serde_json::from_value(payload).map_err(|e| ServiceError::ValidationFailed {
                message: "create payload does not match the task shape".to_string(),
                details: Some(e.to_string()),
            })?;
        payload.validate()?;

        let txn = self.db_pool.begin().await?;
        let outcome = (entry.create)(&txn, &payload, caller).await?;
        txn.commit().await?;

        if outcome.created {
            info!(kind = kind_key, guids = ?outcome.guids, "task created");
            if let Some(events) = &self.event_sender {
                for guid in &outcome.guids {
                    events
                        .send_or_log(Event::TaskCreated {
                            operation_id: *guid,
                            kind: kind_key.to_string(),
                        })
                        .await;
                }
            }
        } else {
            info!(kind = kind_key, guids = ?outcome.guids, "create resolved to existing task");
        }

        Ok(outcome.guids)
    }

    /// Claims a task: NEW -> WORK with ownership. A task already in WORK is
    /// rejected. Composite-take kinds run the collect sub-step first, in the
    /// same transaction.
    #[instrument(skip(self), fields(kind = kind_key, guid = %guid))]
    pub async fn take_task(
        &self,
        kind_key: &str,
        guid: Uuid,
        caller: Uuid,
    ) -> Result<Value, ServiceError> {
        let entry = self.router.resolve(kind_key)?;

        let txn = self.db_pool.begin().await?;
        let op = find_operation(&txn, entry, guid).await?;

        if op.status == OperationStatus::Work.to_string() {
            return Err(ServiceError::AlreadyInProgress(guid));
        }

        if entry.composite_take {
            collect_attached_pallets(&txn, &op).await?;
        }

        let mut active: operation::ActiveModel = op.into();
        active.status = Set(OperationStatus::Work.to_string());
        active.user_id = Set(Some(caller));
        let taken = active.update(&txn).await?;
        txn.commit().await?;

        if let Some(events) = &self.event_sender {
            events
                .send_or_log(Event::TaskTaken {
                    operation_id: guid,
                    user_id: caller,
                })
                .await;
        }

        Ok((entry.shape)(&taken))
    }

    /// Patches status/unloaded/user. Absent fields are untouched; a CLOSE
    /// status routes through the close strategy and then the exchange gate.
    #[instrument(skip(self, patch), fields(kind = kind_key, guid = %guid))]
    pub async fn change_task_properties(
        &self,
        kind_key: &str,
        guid: Uuid,
        patch: PropertiesPatch,
    ) -> Result<Value, ServiceError> {
        let entry = self.router.resolve(kind_key)?;

        let txn = self.db_pool.begin().await?;
        let op = find_operation(&txn, entry, guid).await?;

        let mut events = Vec::new();
        let (updated, gate) = apply_properties(&txn, op, &patch, &mut events).await?;
        txn.commit().await?;

        self.after_commit(events, gate.as_ref()).await?;

        Ok((entry.shape)(&updated))
    }

    /// Applies a kind-specific content change: deserializes the declared
    /// shape, applies the optional properties sub-patch, then invokes the
    /// kind's content function and returns its result.
    #[instrument(skip(self, payload), fields(kind = kind_key, guid = %guid))]
    pub async fn change_task_content(
        &self,
        kind_key: &str,
        guid: Uuid,
        payload: Value,
        caller: Option<Uuid>,
    ) -> Result<Value, ServiceError> {
        let entry = self.router.resolve(kind_key)?;
        let content_fn = entry.content.ok_or_else(|| {
            ServiceError::MalformedContent(format!("task type {kind_key} has no content changes"))
        })?;

        let envelope: ContentPayload = serde_json::from_value(payload)
            .map_err(|e| ServiceError::MalformedContent(e.to_string()))?;

        let txn = self.db_pool.begin().await?;
        let mut op = find_operation(&txn, entry, guid).await?;

        let mut events = Vec::new();
        let mut gate = None;
        if let Some(patch) = &envelope.properties {
            if !patch.is_empty() {
                let (updated, close_gate) = apply_properties(&txn, op, patch, &mut events).await?;
                op = updated;
                gate = close_gate;
            }
        }

        let result = content_fn(&txn, &op, envelope.rest, caller).await?;
        txn.commit().await?;

        self.after_commit(events, gate.as_ref()).await?;

        Ok(result)
    }

    /// Publishes collected events and runs the exchange gate for a close
    /// that deferred its export eligibility.
    async fn after_commit(
        &self,
        events: Vec<Event>,
        gate: Option<&operation::Model>,
    ) -> Result<(), ServiceError> {
        if let Some(sender) = &self.event_sender {
            for event in events {
                sender.send_or_log(event).await;
            }
        }
        if let Some(op) = gate {
            self.exchange.register_to_exchange(op).await?;
        }
        Ok(())
    }
}

async fn find_operation(
    txn: &DatabaseTransaction,
    entry: &RouterEntry,
    guid: Uuid,
) -> Result<operation::Model, ServiceError> {
    operation::Entity::find_by_id(guid)
        .filter(operation::Column::Kind.eq(entry.kind.to_string()))
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or(ServiceError::TaskNotFound(guid))
}

/// The collect sub-step of a composite take: every attached NEW pallet is
/// claimed as COLLECTED.
async fn collect_attached_pallets(
    txn: &DatabaseTransaction,
    op: &operation::Model,
) -> Result<(), ServiceError> {
    let rows = operation_pallet::Entity::find()
        .filter(operation_pallet::Column::OperationId.eq(op.id))
        .all(txn)
        .await?;

    for row in rows {
        let Some(p) = pallet::Entity::find_by_id(row.pallet_id).one(txn).await? else {
            continue;
        };
        if p.status != PalletStatus::New.to_string() {
            continue;
        }
        let mut active: pallet::ActiveModel = p.into();
        active.status = Set(PalletStatus::Collected.to_string());
        active.update(txn).await?;
    }

    Ok(())
}

/// Partial update: only the present fields change. Returns the updated model
/// and, when a gated kind just closed, the model to feed the exchange gate
/// after commit.
async fn apply_properties(
    txn: &DatabaseTransaction,
    op: operation::Model,
    patch: &PropertiesPatch,
    events: &mut Vec<Event>,
) -> Result<(operation::Model, Option<operation::Model>), ServiceError> {
    let mut op = op;

    if let Some(user) = patch.user {
        let mut active: operation::ActiveModel = op.into();
        active.user_id = Set(Some(user));
        op = active.update(txn).await?;
    }

    if let Some(unloaded) = patch.unloaded {
        if unloaded && !op.ready_to_unload {
            return Err(ServiceError::validation(format!(
                "task {} is not ready to unload",
                op.id
            )));
        }
        let mut active: operation::ActiveModel = op.into();
        active.unloaded = Set(unloaded);
        op = active.update(txn).await?;
    }

    if let Some(status) = &patch.status {
        let parsed: OperationStatus = status
            .parse()
            .map_err(|_| ServiceError::validation(format!("unknown status {status}")))?;

        if parsed == OperationStatus::Close {
            let closed = close_operation(txn, op, events).await?;
            let gate = closed
                .kind()
                .map(OperationKind::uses_exchange_gate)
                .unwrap_or(false);
            let gate_op = gate.then(|| closed.clone());
            return Ok((closed, gate_op));
        }

        let mut active: operation::ActiveModel = op.into();
        active.status = Set(parsed.to_string());
        op = active.update(txn).await?;
    }

    Ok((op, None))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ServiceError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ServiceError::InvalidFilter(key.to_string())),
    }
}

fn parse_uuid(key: &str, value: &str) -> Result<Uuid, ServiceError> {
    value
        .parse()
        .map_err(|_| ServiceError::InvalidFilter(key.to_string()))
}
