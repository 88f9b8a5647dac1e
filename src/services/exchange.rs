//! Exchange batch gate: decides when a group of same-day operations becomes
//! eligible for export, and confirms the export afterwards.
//!
//! `ready_to_unload` is granted per group, all or nothing: the flip only
//! happens once every candidate in the group is closed, inside one
//! transaction so two concurrent closes cannot both conclude they were last.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::ExchangeGrouping;
use crate::entities::operation;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Gate over the day's operations, configured with the process-wide grouping
/// policy at construction.
#[derive(Clone)]
pub struct ExchangeService {
    db_pool: Arc<DbPool>,
    grouping: ExchangeGrouping,
    event_sender: Option<Arc<EventSender>>,
}

impl ExchangeService {
    pub fn new(
        db_pool: Arc<DbPool>,
        grouping: ExchangeGrouping,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            grouping,
            event_sender,
        }
    }

    pub fn grouping(&self) -> ExchangeGrouping {
        self.grouping
    }

    /// Attempts to mark the operation's same-day group ready to unload.
    /// Returns whether the grant happened; a `false` leaves every candidate
    /// untouched.
    #[instrument(skip(self, op), fields(operation_id = %op.id, kind = %op.kind))]
    pub async fn register_to_exchange(&self, op: &operation::Model) -> Result<bool, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let granted = register_in_txn(&txn, op, self.grouping).await?;
        txn.commit().await?;

        if let Some(ids) = &granted {
            info!(count = ids.len(), "operation group marked ready to unload");
            if let Some(events) = &self.event_sender {
                events
                    .send_or_log(Event::GroupReadyToUnload {
                        operation_ids: ids.clone(),
                    })
                    .await;
            }
        }

        Ok(granted.is_some())
    }

    /// Confirms the external system consumed the named operations. Unknown
    /// guids fail the whole call; re-confirming an unloaded operation is a
    /// no-op.
    #[instrument(skip(self, guids), fields(count = guids.len()))]
    pub async fn confirm_unloading(&self, guids: &[Uuid]) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        let mut confirmed = Vec::new();
        for guid in guids {
            let op = operation::Entity::find_by_id(*guid)
                .one(&txn)
                .await?
                .ok_or(ServiceError::TaskNotFound(*guid))?;

            if op.unloaded {
                continue;
            }
            if !op.ready_to_unload {
                return Err(ServiceError::validation(format!(
                    "task {guid} is not ready to unload"
                )));
            }

            let mut active: operation::ActiveModel = op.into();
            active.unloaded = Set(true);
            active.update(&txn).await?;
            confirmed.push(*guid);
        }

        txn.commit().await?;

        if let Some(events) = &self.event_sender {
            for guid in confirmed {
                events.send_or_log(Event::UnloadingConfirmed(guid)).await;
            }
        }

        Ok(())
    }
}

/// The gate decision inside one transaction: collect the same-day candidate
/// group under a row lock; grant only when every member is closed.
async fn register_in_txn(
    txn: &DatabaseTransaction,
    op: &operation::Model,
    grouping: ExchangeGrouping,
) -> Result<Option<Vec<Uuid>>, ServiceError> {
    let day_start = op
        .date
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let day_end = day_start + Duration::days(1);

    let mut query = operation::Entity::find()
        .filter(operation::Column::Kind.eq(op.kind.clone()))
        .filter(operation::Column::Date.gte(day_start))
        .filter(operation::Column::Date.lt(day_end))
        .filter(operation::Column::Unloaded.eq(false))
        .filter(operation::Column::ReadyToUnload.eq(false));

    if matches!(grouping, ExchangeGrouping::Line | ExchangeGrouping::LineAndBatch) {
        query = match &op.line {
            Some(line) => query.filter(operation::Column::Line.eq(line.clone())),
            None => query.filter(operation::Column::Line.is_null()),
        };
    }
    if matches!(grouping, ExchangeGrouping::Batch | ExchangeGrouping::LineAndBatch) {
        query = match &op.batch_number {
            Some(batch) => query.filter(operation::Column::BatchNumber.eq(batch.clone())),
            None => query.filter(operation::Column::BatchNumber.is_null()),
        };
    }

    let group = query.lock_exclusive().all(txn).await?;
    if group.is_empty() {
        return Ok(None);
    }
    if group.iter().any(|candidate| !candidate.closed) {
        return Ok(None);
    }

    let mut granted = Vec::with_capacity(group.len());
    for candidate in group {
        let id = candidate.id;
        let mut active: operation::ActiveModel = candidate.into();
        active.ready_to_unload = Set(true);
        active.update(txn).await?;
        granted.push(id);
    }

    Ok(Some(granted))
}

/// Non-authoritative alternative entry point: sweeps the whole current day
/// and gates every group found. The synchronous per-close trigger is
/// canonical; this exists for manual catch-up after configuration changes.
pub async fn register_day_for_exchange(
    service: &ExchangeService,
    db: &DbPool,
) -> Result<usize, ServiceError> {
    let day_start = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();

    let candidates = operation::Entity::find()
        .filter(operation::Column::Date.gte(day_start))
        .filter(operation::Column::Unloaded.eq(false))
        .filter(operation::Column::ReadyToUnload.eq(false))
        .filter(operation::Column::Closed.eq(true))
        .all(db)
        .await?;

    let mut granted_groups = 0;
    for op in candidates {
        // already granted as part of an earlier group in this sweep
        let current = operation::Entity::find_by_id(op.id).one(db).await?;
        if matches!(&current, Some(c) if c.ready_to_unload) {
            continue;
        }
        if service.register_to_exchange(&op).await? {
            granted_groups += 1;
        }
    }

    Ok(granted_groups)
}
