//! Close strategies: the generic close plus per-kind hooks, selected by the
//! operation kind — one concrete operation struct, no inheritance chain.
//!
//! Closing runs entirely on the caller's transaction so the sibling count
//! check and the parent close can never race a concurrent sibling close.

use futures::future::BoxFuture;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{CellState, CollectKind, OperationKind, OperationStatus};
use crate::entities::{
    external_source, operation, operation_cell, pallet, storage_cell, storage_cell_state,
};
use crate::errors::ServiceError;
use crate::events::Event;

/// Closes an operation: before-close hooks, the generic close, then
/// after-close cascades. Events produced along the way are appended to
/// `events` for the caller to publish after commit.
///
/// Kinds gated by the exchange batch do not get `ready_to_unload` here; the
/// task service invokes the gate synchronously after this commit.
pub fn close_operation<'a>(
    txn: &'a DatabaseTransaction,
    op: operation::Model,
    events: &'a mut Vec<Event>,
) -> BoxFuture<'a, Result<operation::Model, ServiceError>> {
    Box::pin(async move {
        if op.closed {
            return Ok(op);
        }

        let kind = op.kind();

        if kind == Some(OperationKind::Placement) {
            record_cell_placements(txn, &op).await?;
        }

        let ready = !kind.map(OperationKind::uses_exchange_gate).unwrap_or(false);
        let op_id = op.id;
        let op_kind = op.kind.clone();
        let mut active: operation::ActiveModel = op.into();
        active.status = Set(OperationStatus::Close.to_string());
        active.closed = Set(true);
        if ready {
            active.ready_to_unload = Set(true);
        }
        let closed = active.update(txn).await?;
        events.push(Event::TaskClosed {
            operation_id: op_id,
            kind: op_kind,
        });

        match kind {
            Some(OperationKind::PalletCollect) => {
                cascade_parent_close(txn, &closed, events).await?;
            }
            Some(OperationKind::Selection) => {
                stamp_task_filtered_pallets(txn, &closed).await?;
            }
            _ => {}
        }

        Ok(closed)
    })
}

/// Placement before-close hook: one PLACED ledger row per cell row, at the
/// destination cell when set, else the source cell.
async fn record_cell_placements(
    txn: &DatabaseTransaction,
    op: &operation::Model,
) -> Result<(), ServiceError> {
    let rows = operation_cell::Entity::find()
        .filter(operation_cell::Column::OperationId.eq(op.id))
        .all(txn)
        .await?;

    for row in rows {
        let Some(cell_id) = row.dest_cell_id.or(row.cell_id) else {
            continue;
        };
        let Some(pallet_id) = row.pallet_id else {
            continue;
        };
        storage_cell_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            cell_id: Set(cell_id),
            pallet_id: Set(pallet_id),
            operation_id: Set(op.id),
            state: Set(CellState::Placed.to_string()),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(txn)
        .await?;
    }

    Ok(())
}

/// Pallet-collect after-close hook: when this was the last open sibling of
/// its parent, close the parent too. Subtypes without a parent mapping, or a
/// missing parent, cascade nowhere — absence is a valid terminal state.
async fn cascade_parent_close(
    txn: &DatabaseTransaction,
    closed: &operation::Model,
    events: &mut Vec<Event>,
) -> Result<(), ServiceError> {
    let Some(parent_id) = closed.parent_task_id else {
        return Ok(());
    };
    let Some(parent_kind) = closed
        .collect_kind
        .as_deref()
        .and_then(|k| k.parse::<CollectKind>().ok())
        .and_then(CollectKind::parent_kind)
    else {
        debug!(operation_id = %closed.id, "collect subtype has no parent mapping, no cascade");
        return Ok(());
    };

    let open_siblings = operation::Entity::find()
        .filter(operation::Column::ParentTaskId.eq(parent_id))
        .filter(operation::Column::Closed.eq(false))
        .count(txn)
        .await?;
    if open_siblings > 0 {
        return Ok(());
    }

    let parent = operation::Entity::find_by_id(parent_id).one(txn).await?;
    let Some(parent) = parent else {
        debug!(%parent_id, "parent task not found, no cascade");
        return Ok(());
    };
    if parent.closed || parent.kind != parent_kind.to_string() {
        return Ok(());
    }

    info!(parent_id = %parent.id, last_child = %closed.id, "last sibling closed, cascading to parent");
    close_operation(txn, parent, events).await?;
    events.push(Event::ParentTaskClosed {
        parent_id,
        last_child_id: closed.id,
    });

    Ok(())
}

/// Selection after-close hook: pallets routed to task-filtered cells get the
/// selection's external task key stamped on them, so a later placement knows
/// which task to filter against.
async fn stamp_task_filtered_pallets(
    txn: &DatabaseTransaction,
    closed: &operation::Model,
) -> Result<(), ServiceError> {
    let task_key = match closed.external_source_id {
        Some(id) => external_source::Entity::find_by_id(id)
            .one(txn)
            .await?
            .map(|s| s.external_key),
        None => None,
    };
    let Some(task_key) = task_key else {
        return Ok(());
    };

    let rows = operation_cell::Entity::find()
        .filter(operation_cell::Column::OperationId.eq(closed.id))
        .all(txn)
        .await?;

    for row in rows {
        let Some(dest_cell_id) = row.dest_cell_id else {
            continue;
        };
        let Some(pallet_id) = row.pallet_id else {
            continue;
        };
        let needs_filter = storage_cell::Entity::find_by_id(dest_cell_id)
            .one(txn)
            .await?
            .map(|c| c.needs_task_filter)
            .unwrap_or(false);
        if !needs_filter {
            continue;
        }

        let Some(pallet_row) = pallet::Entity::find_by_id(pallet_id).one(txn).await? else {
            continue;
        };
        let mut active: pallet::ActiveModel = pallet_row.into();
        active.external_task_key = Set(Some(task_key.clone()));
        active.update(txn).await?;
    }

    Ok(())
}
