//! Type-specific content-mutation functions referenced by the router tables.
//!
//! Each deserializes its declared shape from the remaining payload (shape
//! mismatch is `MalformedContent`), mutates the operation's content rows on
//! the caller's transaction and returns a result object for the response.

use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::domain::{CollectKind, OperationKind};
use crate::entities::{operation, operation_cell, operation_product, pallet};
use crate::errors::ServiceError;
use crate::router::payload::{CellContentChange, CollectContentChange, FactContentChange};
use crate::services::create::lookup_cell;
use crate::services::pallets::{
    check_and_collect_orders, remove_boxes_from_pallet, WithdrawalRequest,
};

fn parse<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ServiceError> {
    serde_json::from_value(value).map_err(|e| ServiceError::MalformedContent(e.to_string()))
}

/// Withdrawal reason implied by the operation being mutated.
fn collect_kind_for(op: &operation::Model) -> CollectKind {
    match op.kind() {
        Some(OperationKind::PalletCollect) => op
            .collect_kind
            .as_deref()
            .and_then(|k| k.parse().ok())
            .unwrap_or(CollectKind::Acceptance),
        Some(OperationKind::Shipment) | Some(OperationKind::MovementShipment) => {
            CollectKind::Shipment
        }
        Some(OperationKind::Selection) => CollectKind::Selection,
        Some(OperationKind::Inventory) => CollectKind::Inventory,
        Some(OperationKind::WriteOff) => CollectKind::WriteOff,
        _ => CollectKind::Acceptance,
    }
}

/// Fills destination cells on the operation's cell rows (placement,
/// selection).
pub fn cells_content<'a>(
    txn: &'a DatabaseTransaction,
    op: &'a operation::Model,
    payload: serde_json::Value,
    _caller: Option<Uuid>,
) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>> {
    Box::pin(async move {
        let change: CellContentChange = parse(payload)?;
        let mut updated = 0usize;

        for dest in &change.cells {
            let cell = lookup_cell(txn, &dest.cell).await?.ok_or_else(|| {
                ServiceError::validation(format!("cell {} not found", dest.cell))
            })?;

            let row = operation_cell::Entity::find()
                .filter(operation_cell::Column::OperationId.eq(op.id))
                .filter(operation_cell::Column::CellId.eq(cell.id))
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::validation(format!(
                        "cell {} is not part of task {}",
                        dest.cell, op.id
                    ))
                })?;

            let dest_cell_id = match &dest.dest_cell {
                Some(key) => Some(
                    lookup_cell(txn, key)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::validation(format!("cell {key} not found"))
                        })?
                        .id,
                ),
                None => None,
            };
            let pallet_id = match &dest.pallet {
                Some(code) => pallet::Entity::find()
                    .filter(pallet::Column::Code.eq(code.clone()))
                    .one(txn)
                    .await?
                    .map(|p| p.id),
                None => None,
            };

            let mut active: operation_cell::ActiveModel = row.into();
            if dest_cell_id.is_some() {
                active.dest_cell_id = Set(dest_cell_id);
            }
            if pallet_id.is_some() {
                active.pallet_id = Set(pallet_id);
            }
            active.update(txn).await?;
            updated += 1;
        }

        Ok(json!({ "updated": updated }))
    })
}

/// Records fact quantities and applies withdrawals (inventory, write-off).
pub fn fact_content<'a>(
    txn: &'a DatabaseTransaction,
    op: &'a operation::Model,
    payload: serde_json::Value,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>> {
    Box::pin(async move {
        let change: FactContentChange = parse(payload)?;
        let reason = collect_kind_for(op);
        let mut updated = 0usize;

        for fact in &change.products {
            let row = operation_product::Entity::find()
                .filter(operation_product::Column::OperationId.eq(op.id))
                .filter(operation_product::Column::ProductKey.eq(fact.external_key.clone()))
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::validation(format!(
                        "product line {} is not part of task {}",
                        fact.external_key, op.id
                    ))
                })?;

            let planned = row.count;
            let mut active: operation_product::ActiveModel = row.into();
            active.fact_count = Set(Some(fact.fact_count));
            active.update(txn).await?;
            updated += 1;

            if fact.fact_count != planned {
                tracing::info!(
                    key = %fact.external_key,
                    planned,
                    fact = fact.fact_count,
                    "fact count diverges from plan"
                );
            }
        }

        let mut withdrawn = 0usize;
        for w in &change.withdrawals {
            let dest_pallet_id = match &w.dest_pallet {
                Some(code) => pallet::Entity::find()
                    .filter(pallet::Column::Code.eq(code.clone()))
                    .one(txn)
                    .await?
                    .map(|p| p.id),
                None => None,
            };
            remove_boxes_from_pallet(
                txn,
                &WithdrawalRequest {
                    pallet_code: w.pallet.clone(),
                    count: w.count,
                    weight: w.weight.unwrap_or(Decimal::ZERO),
                    collect_kind: reason,
                    product_key: w.product_key.clone(),
                    dest_pallet_id,
                    related_task_id: Some(op.id),
                    user_id: caller,
                },
            )
            .await?;
            withdrawn += 1;
        }

        Ok(json!({ "updated": updated, "withdrawn": withdrawn }))
    })
}

/// Collects boxes from source pallets (acceptance, pallet-collect, shipment)
/// and runs the order aggregation check over the touched product lines.
pub fn collect_content<'a>(
    txn: &'a DatabaseTransaction,
    op: &'a operation::Model,
    payload: serde_json::Value,
    caller: Option<Uuid>,
) -> BoxFuture<'a, Result<serde_json::Value, ServiceError>> {
    Box::pin(async move {
        let change: CollectContentChange = parse(payload)?;
        let reason = collect_kind_for(op);

        let mut touched_keys: Vec<String> = Vec::new();
        for w in &change.sources {
            let dest_pallet_id = match &w.dest_pallet {
                Some(code) => pallet::Entity::find()
                    .filter(pallet::Column::Code.eq(code.clone()))
                    .one(txn)
                    .await?
                    .map(|p| p.id),
                None => None,
            };
            remove_boxes_from_pallet(
                txn,
                &WithdrawalRequest {
                    pallet_code: w.pallet.clone(),
                    count: w.count,
                    weight: w.weight.unwrap_or(Decimal::ZERO),
                    collect_kind: reason,
                    product_key: w.product_key.clone(),
                    dest_pallet_id,
                    related_task_id: Some(op.id),
                    user_id: caller,
                },
            )
            .await?;
            if let Some(key) = &w.product_key {
                if !touched_keys.contains(key) {
                    touched_keys.push(key.clone());
                }
            }
        }

        let closed_orders = check_and_collect_orders(txn, &touched_keys).await?;

        Ok(json!({
            "withdrawn": change.sources.len(),
            "orders_closed": closed_orders,
        }))
    })
}
