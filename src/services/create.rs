//! Type-specific create functions referenced by the router tables.
//!
//! All share the same skeleton: resolve the external source, return the
//! existing operation when the (kind, external key) pair already has one,
//! otherwise insert the operation with the next per-kind number and attach
//! its content rows. Everything runs on the caller's transaction.

use chrono::Utc;
use futures::future::BoxFuture;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::info;
use uuid::Uuid;

use crate::domain::{OperationKind, OperationStatus};
use crate::entities::{
    external_source, operation, operation_cell, operation_pallet, operation_product, pallet,
    storage_cell, ContentProps,
};
use crate::errors::ServiceError;
use crate::router::payload::{CellItem, CreateTaskPayload, PalletItem, ProductLineItem};
use crate::router::CreateOutcome;
use crate::services::pallets::{create_pallets_in_txn, lookup_product, lookup_shift};

/// Next value of the per-kind monotonic number sequence.
pub async fn next_number(
    txn: &DatabaseTransaction,
    kind: OperationKind,
) -> Result<i64, ServiceError> {
    let last = operation::Entity::find()
        .filter(operation::Column::Kind.eq(kind.to_string()))
        .order_by_desc(operation::Column::Number)
        .one(txn)
        .await?;
    Ok(last.map(|op| op.number + 1).unwrap_or(1))
}

/// Resolves the upstream document reference, creating it on first sight.
pub async fn get_or_create_external_source(
    txn: &DatabaseTransaction,
    payload: &CreateTaskPayload,
) -> Result<external_source::Model, ServiceError> {
    if let Some(found) = external_source::Entity::find()
        .filter(external_source::Column::ExternalKey.eq(payload.external_key.clone()))
        .one(txn)
        .await?
    {
        return Ok(found);
    }

    Ok(external_source::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.clone().unwrap_or_default()),
        external_key: Set(payload.external_key.clone()),
        number: Set(payload.document_number.clone()),
        document_date: Set(payload.document_date),
    }
    .insert(txn)
    .await?)
}

/// Result of the shared create skeleton: either the operation already
/// registered for this external key, or a freshly inserted one awaiting its
/// content rows.
enum Base {
    Existing(operation::Model),
    Fresh(operation::Model),
}

/// Shared create skeleton: external source resolution, the idempotency
/// check, and the operation insert.
async fn create_base(
    txn: &DatabaseTransaction,
    kind: OperationKind,
    payload: &CreateTaskPayload,
    caller: Option<Uuid>,
) -> Result<Base, ServiceError> {
    let source = get_or_create_external_source(txn, payload).await?;

    let existing = operation::Entity::find()
        .filter(operation::Column::Kind.eq(kind.to_string()))
        .filter(operation::Column::ExternalSourceId.eq(source.id))
        .one(txn)
        .await?;
    if let Some(found) = existing {
        return Ok(Base::Existing(found));
    }

    let number = match payload.task_number {
        Some(explicit) => explicit,
        None => next_number(txn, kind).await?,
    };

    let op = operation::ActiveModel {
        id: Set(Uuid::new_v4()),
        number: Set(number),
        kind: Set(kind.to_string()),
        date: Set(Utc::now()),
        status: Set(OperationStatus::New.to_string()),
        closed: Set(false),
        ready_to_unload: Set(false),
        unloaded: Set(false),
        external_source_id: Set(Some(source.id)),
        user_id: Set(caller),
        parent_task_id: Set(payload.parent_task),
        collect_kind: Set(payload.collect_kind.map(|k| k.to_string())),
        line: Set(payload.line.clone()),
        batch_number: Set(payload.batch_number.clone()),
        storage_key: Set(payload.storage.clone()),
        direction_key: Set(payload.direction.clone()),
    }
    .insert(txn)
    .await?;

    info!(operation_id = %op.id, kind = %kind, number = op.number, "operation created");
    Ok(Base::Fresh(op))
}

fn existing_outcome(op: operation::Model) -> CreateOutcome {
    CreateOutcome {
        guids: vec![op.id],
        created: false,
    }
}

fn fresh_outcome(op: &operation::Model) -> CreateOutcome {
    CreateOutcome {
        guids: vec![op.id],
        created: true,
    }
}

async fn source_name(
    txn: &DatabaseTransaction,
    op: &operation::Model,
) -> Result<Option<String>, ServiceError> {
    match op.external_source_id {
        Some(id) => Ok(external_source::Entity::find_by_id(id)
            .one(txn)
            .await?
            .map(|s| s.name)),
        None => Ok(None),
    }
}

/// Creates payload pallets and attaches them to the operation.
async fn attach_pallets(
    txn: &DatabaseTransaction,
    op: &operation::Model,
    items: &[PalletItem],
) -> Result<(), ServiceError> {
    let name = source_name(txn, op).await?;
    let pallets = create_pallets_in_txn(txn, items, op.user_id, Some(op.id)).await?;

    for (item, model) in items.iter().zip(pallets.iter()) {
        let dependent = match &item.dependent_pallet {
            Some(code) => lookup_pallet(txn, code).await?.map(|p| p.id),
            None => None,
        };
        let props = ContentProps::for_operation(op, name.clone());
        operation_pallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            operation_id: Set(op.id),
            pallet_id: Set(model.id),
            dependent_pallet_id: Set(dependent),
            op_kind: Set(props.op_kind),
            op_number: Set(props.op_number),
            source_name: Set(props.source_name),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

async fn attach_products(
    txn: &DatabaseTransaction,
    op: &operation::Model,
    lines: &[ProductLineItem],
) -> Result<(), ServiceError> {
    let name = source_name(txn, op).await?;
    for line in lines {
        let product_id = match &line.product {
            Some(key) => lookup_product(txn, key).await?.map(|p| p.id),
            None => None,
        };
        let props = ContentProps::for_operation(op, name.clone());
        operation_product::ActiveModel {
            id: Set(Uuid::new_v4()),
            operation_id: Set(op.id),
            product_id: Set(product_id),
            product_key: Set(Some(line.external_key.clone())),
            count: Set(line.count),
            fact_count: Set(None),
            op_kind: Set(props.op_kind),
            op_number: Set(props.op_number),
            source_name: Set(props.source_name),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

async fn attach_cells(
    txn: &DatabaseTransaction,
    op: &operation::Model,
    cells: &[CellItem],
) -> Result<(), ServiceError> {
    let name = source_name(txn, op).await?;
    for item in cells {
        let cell_id = match &item.cell {
            Some(key) => lookup_cell(txn, key).await?.map(|c| c.id),
            None => None,
        };
        let dest_cell_id = match &item.dest_cell {
            Some(key) => lookup_cell(txn, key).await?.map(|c| c.id),
            None => None,
        };
        let pallet_id = match &item.pallet {
            Some(code) => lookup_pallet(txn, code).await?.map(|p| p.id),
            None => None,
        };
        let props = ContentProps::for_operation(op, name.clone());
        operation_cell::ActiveModel {
            id: Set(Uuid::new_v4()),
            operation_id: Set(op.id),
            cell_id: Set(cell_id),
            dest_cell_id: Set(dest_cell_id),
            pallet_id: Set(pallet_id),
            op_kind: Set(props.op_kind),
            op_number: Set(props.op_number),
            source_name: Set(props.source_name),
        }
        .insert(txn)
        .await?;
    }
    Ok(())
}

pub(crate) async fn lookup_cell(
    txn: &DatabaseTransaction,
    external_key: &str,
) -> Result<Option<storage_cell::Model>, ServiceError> {
    Ok(storage_cell::Entity::find()
        .filter(storage_cell::Column::ExternalKey.eq(external_key))
        .one(txn)
        .await?)
}

pub(crate) async fn lookup_pallet(
    txn: &DatabaseTransaction,
    code: &str,
) -> Result<Option<pallet::Model>, ServiceError> {
    Ok(pallet::Entity::find()
        .filter(pallet::Column::Code.eq(code))
        .one(txn)
        .await?)
}

// ---------------------------------------------------------------------------
// router-facing create functions

pub fn create_acceptance<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Acceptance, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        attach_products(txn, &op, &payload.products).await?;
        Ok(fresh_outcome(&op))
    })
}

/// Pallet-collect create: requires an open shift and a collect subtype.
pub fn create_pallet_collect<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        if payload.collect_kind.is_none() {
            return Err(ServiceError::validation(
                "collect_kind is required for pallet collect tasks",
            ));
        }
        let shift_key = payload
            .shift
            .as_deref()
            .ok_or_else(|| ServiceError::validation("shift is required for pallet collect tasks"))?;
        let shift = lookup_shift(txn, shift_key)
            .await?
            .ok_or_else(|| ServiceError::validation(format!("shift {shift_key} not found")))?;
        if shift.closed {
            return Err(ServiceError::validation(format!(
                "shift {shift_key} is closed"
            )));
        }

        let op = match create_base(txn, OperationKind::PalletCollect, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_placement<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Placement, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_cells(txn, &op, &payload.cells).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_movement<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Movement, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_shipment<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Shipment, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        attach_products(txn, &op, &payload.products).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_selection<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Selection, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_cells(txn, &op, &payload.cells).await?;
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_order<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Order, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_inventory<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Inventory, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_products(txn, &op, &payload.products).await?;
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_repacking<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::Repacking, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_arrival_at_stock<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::ArrivalAtStock, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_write_off<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::WriteOff, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_products(txn, &op, &payload.products).await?;
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

/// Cancel-shipment create: must reference the shipment being cancelled.
pub fn create_cancel_shipment<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let parent = payload.parent_task.ok_or_else(|| {
            ServiceError::validation("cancel shipment requires the shipment task reference")
        })?;
        match operation::Entity::find_by_id(parent).one(txn).await? {
            Some(op) if op.kind == OperationKind::Shipment.to_string() => {}
            Some(_) => {
                return Err(ServiceError::validation(
                    "referenced parent task is not a shipment",
                ))
            }
            None => return Err(ServiceError::TaskNotFound(parent)),
        }

        let op = match create_base(txn, OperationKind::CancelShipment, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        Ok(fresh_outcome(&op))
    })
}

pub fn create_movement_shipment<'a>(
    txn: &'a DatabaseTransaction,
    payload: &'a CreateTaskPayload,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<CreateOutcome, ServiceError>> {
    Box::pin(async move {
        let op = match create_base(txn, OperationKind::MovementShipment, payload, caller).await? {
            Base::Existing(op) => return Ok(existing_outcome(op)),
            Base::Fresh(op) => op,
        };
        attach_pallets(txn, &op, &payload.pallets).await?;
        attach_products(txn, &op, &payload.products).await?;
        Ok(fresh_outcome(&op))
    })
}
