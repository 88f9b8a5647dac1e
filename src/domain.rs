//! Domain vocabulary shared across entities, services and handlers.
//!
//! Statuses are persisted as their string form; the enums exist so service
//! code never compares raw string literals.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Task type key resolved through the router.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Acceptance,
    PalletCollect,
    Placement,
    Movement,
    Shipment,
    Selection,
    Order,
    Inventory,
    Repacking,
    ArrivalAtStock,
    WriteOff,
    CancelShipment,
    MovementShipment,
}

impl OperationKind {
    /// Kinds whose close defers `ready_to_unload` to the exchange batch gate
    /// instead of granting it directly.
    pub fn uses_exchange_gate(self) -> bool {
        matches!(
            self,
            OperationKind::Acceptance | OperationKind::ArrivalAtStock | OperationKind::Repacking
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    New,
    Work,
    Wait,
    Close,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PalletStatus {
    New,
    Collected,
    Confirmed,
    Posted,
    Shipped,
    Archived,
    Waited,
    ForShipment,
    Selected,
    Placed,
    ForRepacking,
    ForPlaced,
    PreForShipment,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PalletType {
    Shipped,
    Fulled,
    Combined,
    Repacking,
}

/// Reason a quantity left a source pallet; also the subtype of a
/// pallet-collect task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectKind {
    Acceptance,
    Shipment,
    Selection,
    Inventory,
    WriteOff,
    Divided,
}

impl CollectKind {
    /// Parent task kind a closing collect task cascades into. Subtypes
    /// without a parent mapping cascade nowhere.
    pub fn parent_kind(self) -> Option<OperationKind> {
        match self {
            CollectKind::Shipment => Some(OperationKind::Shipment),
            CollectKind::Selection => Some(OperationKind::Selection),
            _ => None,
        }
    }
}

/// Cell occupancy ledger event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellState {
    Placed,
    Removed,
}

/// Process-wide grouping policy for the exchange batch gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExchangeGrouping {
    Line,
    Batch,
    LineAndBatch,
}
