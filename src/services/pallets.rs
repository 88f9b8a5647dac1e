//! Pallet and source accounting: creation, splitting, withdrawal bookkeeping
//! and the order-fulfillment aggregation check.
//!
//! Every withdrawal decrements the source pallet and appends exactly one
//! `pallet_sources` ledger row inside the same transaction; the ledger, not
//! the pallet's current fields, answers "how many boxes came from where".

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::domain::{CollectKind, OperationKind, OperationStatus, PalletStatus, PalletType};
use crate::entities::{
    aggregation_code, operation, operation_pallet, pallet, pallet_product, pallet_source, product,
    shift, ContentProps,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::router::payload::PalletItem;
use crate::services::create::next_number;

/// Shape of the pallet split off by `divide_pallet`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DividePalletSpec {
    /// Code for the new pallet; derived from the source code when absent.
    pub code: Option<String>,
    #[validate(range(min = 1, message = "Divide count must be positive"))]
    pub count: i32,
    pub weight: Option<Decimal>,
    pub pallet_type: Option<String>,
}

/// One withdrawal of quantity from a source pallet.
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    pub pallet_code: String,
    pub count: i32,
    pub weight: Decimal,
    pub collect_kind: CollectKind,
    pub product_key: Option<String>,
    pub dest_pallet_id: Option<Uuid>,
    pub related_task_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Service wrapper exposing pallet accounting over its own transactions.
#[derive(Clone)]
pub struct PalletService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl PalletService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates pallets from external items; upsert by code, result order
    /// matches input order.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn create_pallets(
        &self,
        items: Vec<PalletItem>,
        caller: Option<Uuid>,
    ) -> Result<Vec<pallet::Model>, ServiceError> {
        for item in &items {
            item.validate()?;
        }

        let txn = self.db_pool.begin().await?;
        let pallets = create_pallets_in_txn(&txn, &items, caller, None).await?;
        txn.commit().await?;

        if let Some(events) = &self.event_sender {
            for p in &pallets {
                events.send_or_log(Event::PalletCreated(p.id)).await;
            }
        }

        Ok(pallets)
    }

    /// Splits a pallet. See [`divide_pallet_in_txn`] for the branching rules.
    #[instrument(skip(self, spec), fields(source = %source_code, kind = %task_kind))]
    pub async fn divide_pallet(
        &self,
        source_code: &str,
        spec: DividePalletSpec,
        caller: Option<Uuid>,
        task_kind: OperationKind,
    ) -> Result<Vec<pallet::Model>, ServiceError> {
        spec.validate()?;

        let txn = self.db_pool.begin().await?;
        let result = divide_pallet_in_txn(&txn, source_code, &spec, caller, task_kind).await?;
        txn.commit().await?;

        if let Some(events) = &self.event_sender {
            if let [source, new_pallet] = &result[..] {
                events
                    .send_or_log(Event::PalletDivided {
                        source_id: source.id,
                        new_id: new_pallet.id,
                        count: spec.count,
                    })
                    .await;
            }
        }

        Ok(result)
    }
}

/// Upserts pallets by internal id (preferred) or code. Nested product lines
/// and aggregation codes are populated on first creation only.
pub async fn create_pallets_in_txn(
    txn: &DatabaseTransaction,
    items: &[PalletItem],
    _caller: Option<Uuid>,
    parent_task: Option<Uuid>,
) -> Result<Vec<pallet::Model>, ServiceError> {
    let mut result = Vec::with_capacity(items.len());

    for item in items {
        let existing = match item.id {
            Some(id) => pallet::Entity::find_by_id(id).one(txn).await?,
            None => None,
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => {
                pallet::Entity::find()
                    .filter(pallet::Column::Code.eq(item.code.clone()))
                    .one(txn)
                    .await?
            }
        };

        if let Some(found) = existing {
            result.push(found);
            continue;
        }

        let product_id = match &item.product {
            Some(key) => lookup_product(txn, key).await?.map(|p| p.id),
            None => None,
        };
        let shift_id = match &item.shift {
            Some(key) => lookup_shift(txn, key).await?.map(|s| s.id),
            None => None,
        };

        let pallet_id = item.id.unwrap_or_else(Uuid::new_v4);
        let model = pallet::ActiveModel {
            id: Set(pallet_id),
            code: Set(item.code.clone()),
            product_id: Set(product_id),
            status: Set(PalletStatus::New.to_string()),
            weight: Set(item.weight.unwrap_or(Decimal::ZERO)),
            content_count: Set(item.content_count.unwrap_or(0)),
            pallet_type: Set(item
                .pallet_type
                .clone()
                .unwrap_or_else(|| PalletType::Fulled.to_string())),
            batch_number: Set(item.batch_number.clone()),
            production_date: Set(item.production_date),
            series: Set(item.series.clone()),
            shift_id: Set(shift_id),
            production_shop: Set(item.production_shop.clone()),
            external_task_key: Set(None),
            collect_task_id: Set(parent_task),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;

        for line in &item.products {
            let line_product_id = match &line.product {
                Some(key) => lookup_product(txn, key).await?.map(|p| p.id),
                None => None,
            };
            pallet_product::ActiveModel {
                id: Set(Uuid::new_v4()),
                pallet_id: Set(model.id),
                product_id: Set(line_product_id),
                external_key: Set(line.external_key.clone()),
                count: Set(line.count),
                is_collected: Set(false),
                has_divergence: Set(false),
            }
            .insert(txn)
            .await?;
        }

        attach_aggregation_codes(txn, model.id, &item.aggregation_codes).await?;

        result.push(model);
    }

    Ok(result)
}

/// Attaches scan codes to a pallet; a code already attached anywhere is
/// skipped.
pub async fn attach_aggregation_codes(
    txn: &DatabaseTransaction,
    pallet_id: Uuid,
    codes: &[String],
) -> Result<usize, ServiceError> {
    let mut attached = 0;
    for code in codes {
        let exists = aggregation_code::Entity::find()
            .filter(aggregation_code::Column::Code.eq(code.clone()))
            .one(txn)
            .await?;
        if exists.is_some() {
            continue;
        }
        aggregation_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            pallet_id: Set(pallet_id),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await?;
        attached += 1;
    }
    Ok(attached)
}

/// Withdraws quantity from a source pallet under a row lock, pairing the
/// decrement with exactly one ledger row. Exhausted pallets are clamped to
/// zero and archived.
pub async fn remove_boxes_from_pallet(
    txn: &DatabaseTransaction,
    request: &WithdrawalRequest,
) -> Result<pallet::Model, ServiceError> {
    let source = pallet::Entity::find()
        .filter(pallet::Column::Code.eq(request.pallet_code.clone()))
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("pallet {}", request.pallet_code)))?;

    if request.count > source.content_count {
        return Err(ServiceError::InsufficientQuantity {
            pallet: source.code,
            requested: request.count,
            available: source.content_count,
        });
    }

    pallet_source::ActiveModel {
        id: Set(Uuid::new_v4()),
        pallet_id: Set(source.id),
        dest_pallet_id: Set(request.dest_pallet_id),
        count: Set(request.count),
        weight: Set(request.weight),
        collect_kind: Set(request.collect_kind.to_string()),
        product_key: Set(request.product_key.clone()),
        related_task_id: Set(request.related_task_id),
        user_id: Set(request.user_id),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    apply_withdrawal(txn, source, request.count, request.weight).await
}

/// Applies the quantity decrement and the archival clamp to a locked source
/// pallet row.
async fn apply_withdrawal(
    txn: &DatabaseTransaction,
    source: pallet::Model,
    count: i32,
    weight: Decimal,
) -> Result<pallet::Model, ServiceError> {
    let mut new_count = source.content_count - count;
    // weight decrement only when both sides are nonzero, so zero-weight
    // "by count" pallets keep their zero instead of going negative
    let mut new_weight = if source.weight > Decimal::ZERO && weight > Decimal::ZERO {
        source.weight - weight
    } else {
        source.weight
    };

    let source_id = source.id;
    let mut active: pallet::ActiveModel = source.into();

    if new_count <= 0 || new_weight < Decimal::ZERO {
        new_count = 0;
        new_weight = Decimal::ZERO;
        active.status = Set(PalletStatus::Archived.to_string());
        info!(pallet_id = %source_id, "pallet exhausted, archiving");
    }

    active.content_count = Set(new_count);
    active.weight = Set(new_weight);
    Ok(active.update(txn).await?)
}

/// Splits `spec.count`/`spec.weight` off a source pallet into a new one.
///
/// The new pallet inherits product, shift, production shop, batch, production
/// date and series from the source. Behavior then branches by task kind:
/// acceptance-to-stock wraps the split in a DIVIDED pallet-collect task
/// parented to the source's collect task; movement-with-shipment rewires the
/// existing operation-pallet row's dependent pallet instead of creating a new
/// operation.
///
/// Returns `[source, new_pallet]` post-update.
pub async fn divide_pallet_in_txn(
    txn: &DatabaseTransaction,
    source_code: &str,
    spec: &DividePalletSpec,
    caller: Option<Uuid>,
    task_kind: OperationKind,
) -> Result<Vec<pallet::Model>, ServiceError> {
    let source = pallet::Entity::find()
        .filter(pallet::Column::Code.eq(source_code))
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("pallet {source_code}")))?;

    if spec.count > source.content_count {
        return Err(ServiceError::InsufficientQuantity {
            pallet: source.code,
            requested: spec.count,
            available: source.content_count,
        });
    }

    let weight = spec.weight.unwrap_or(Decimal::ZERO);
    let new_code = spec
        .code
        .clone()
        .unwrap_or_else(|| format!("{}-{}", source.code, &Uuid::new_v4().simple().to_string()[..8]));

    let new_pallet = pallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(new_code),
        product_id: Set(source.product_id),
        status: Set(PalletStatus::New.to_string()),
        weight: Set(weight),
        content_count: Set(spec.count),
        pallet_type: Set(spec
            .pallet_type
            .clone()
            .unwrap_or_else(|| source.pallet_type.clone())),
        batch_number: Set(source.batch_number.clone()),
        production_date: Set(source.production_date),
        series: Set(source.series.clone()),
        shift_id: Set(source.shift_id),
        production_shop: Set(source.production_shop.clone()),
        external_task_key: Set(None),
        collect_task_id: Set(source.collect_task_id),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    pallet_source::ActiveModel {
        id: Set(Uuid::new_v4()),
        pallet_id: Set(source.id),
        dest_pallet_id: Set(Some(new_pallet.id)),
        count: Set(spec.count),
        weight: Set(weight),
        collect_kind: Set(CollectKind::Divided.to_string()),
        product_key: Set(None),
        related_task_id: Set(None),
        user_id: Set(caller),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;

    let source_collect_task = source.collect_task_id;
    let source = apply_withdrawal(txn, source, spec.count, weight).await?;

    match task_kind {
        OperationKind::Acceptance | OperationKind::ArrivalAtStock => {
            let number = next_number(txn, OperationKind::PalletCollect).await?;
            let op = operation::ActiveModel {
                id: Set(Uuid::new_v4()),
                number: Set(number),
                kind: Set(OperationKind::PalletCollect.to_string()),
                date: Set(Utc::now()),
                status: Set(OperationStatus::New.to_string()),
                closed: Set(false),
                ready_to_unload: Set(false),
                unloaded: Set(false),
                external_source_id: Set(None),
                user_id: Set(caller),
                parent_task_id: Set(source_collect_task),
                collect_kind: Set(Some(CollectKind::Divided.to_string())),
                line: Set(None),
                batch_number: Set(source.batch_number.clone()),
                storage_key: Set(None),
                direction_key: Set(None),
            }
            .insert(txn)
            .await?;

            let props = ContentProps::for_operation(&op, None);
            operation_pallet::ActiveModel {
                id: Set(Uuid::new_v4()),
                operation_id: Set(op.id),
                pallet_id: Set(source.id),
                dependent_pallet_id: Set(Some(new_pallet.id)),
                op_kind: Set(props.op_kind),
                op_number: Set(props.op_number),
                source_name: Set(props.source_name),
            }
            .insert(txn)
            .await?;
        }
        OperationKind::MovementShipment => {
            let row = operation_pallet::Entity::find()
                .filter(operation_pallet::Column::PalletId.eq(source.id))
                .filter(
                    operation_pallet::Column::OpKind.eq(OperationKind::MovementShipment.to_string()),
                )
                .order_by_desc(operation_pallet::Column::OpNumber)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::validation(format!(
                        "pallet {} is not part of a movement-with-shipment task",
                        source.code
                    ))
                })?;
            let mut active: operation_pallet::ActiveModel = row.into();
            active.dependent_pallet_id = Set(Some(new_pallet.id));
            active.update(txn).await?;
        }
        other => {
            warn!(kind = %other, "divide_pallet called for a kind with no split wiring");
        }
    }

    Ok(vec![source, new_pallet])
}

/// Order-fulfillment aggregation check. For each touched product-line key,
/// sums the sourced quantity from the ledger and marks the line collected
/// once the sum reaches the required count; an order closes only when every
/// line of every pallet attached to it is collected.
///
/// Returns the guids of orders closed by this call.
pub async fn check_and_collect_orders(
    txn: &DatabaseTransaction,
    product_keys: &[String],
) -> Result<Vec<Uuid>, ServiceError> {
    let mut touched_pallets: Vec<Uuid> = Vec::new();

    for key in product_keys {
        let lines = pallet_product::Entity::find()
            .filter(pallet_product::Column::ExternalKey.eq(key.clone()))
            .all(txn)
            .await?;
        if lines.is_empty() {
            continue;
        }

        let sourced: i64 = pallet_source::Entity::find()
            .filter(pallet_source::Column::ProductKey.eq(key.clone()))
            .all(txn)
            .await?
            .iter()
            .map(|row| row.count as i64)
            .sum();

        for line in lines {
            if !line.is_collected && sourced >= line.count as i64 {
                let pallet_id = line.pallet_id;
                let mut active: pallet_product::ActiveModel = line.into();
                active.is_collected = Set(true);
                active.update(txn).await?;
                touched_pallets.push(pallet_id);
            }
        }
    }

    let mut closed_orders = Vec::new();
    for pallet_id in touched_pallets {
        let order_rows = operation_pallet::Entity::find()
            .filter(operation_pallet::Column::PalletId.eq(pallet_id))
            .filter(operation_pallet::Column::OpKind.eq(OperationKind::Order.to_string()))
            .all(txn)
            .await?;

        for row in order_rows {
            let order = operation::Entity::find_by_id(row.operation_id)
                .one(txn)
                .await?;
            let Some(order) = order else { continue };
            if order.closed || closed_orders.contains(&order.id) {
                continue;
            }
            if order_fully_collected(txn, order.id).await? {
                let order_id = order.id;
                let mut active: operation::ActiveModel = order.into();
                active.status = Set(OperationStatus::Close.to_string());
                active.closed = Set(true);
                active.ready_to_unload = Set(true);
                active.update(txn).await?;
                closed_orders.push(order_id);
                info!(%order_id, "order fully collected, closed");
            }
        }
    }

    Ok(closed_orders)
}

/// True when every product line of every pallet attached to the order is
/// collected.
async fn order_fully_collected(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<bool, ServiceError> {
    let pallet_rows = operation_pallet::Entity::find()
        .filter(operation_pallet::Column::OperationId.eq(order_id))
        .all(txn)
        .await?;

    for row in pallet_rows {
        let open_lines = pallet_product::Entity::find()
            .filter(pallet_product::Column::PalletId.eq(row.pallet_id))
            .filter(pallet_product::Column::IsCollected.eq(false))
            .count(txn)
            .await?;
        if open_lines > 0 {
            return Ok(false);
        }
    }

    Ok(true)
}

pub(crate) async fn lookup_product(
    txn: &DatabaseTransaction,
    external_key: &str,
) -> Result<Option<product::Model>, ServiceError> {
    Ok(product::Entity::find()
        .filter(product::Column::ExternalKey.eq(external_key))
        .one(txn)
        .await?)
}

pub(crate) async fn lookup_shift(
    txn: &DatabaseTransaction,
    external_key: &str,
) -> Result<Option<shift::Model>, ServiceError> {
    Ok(shift::Entity::find()
        .filter(shift::Column::ExternalKey.eq(external_key))
        .one(txn)
        .await?)
}
