use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::CollectKind;

/// Create payload shared by every task kind. The external key is the
/// idempotency key: one operation per (kind, external_key).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTaskPayload {
    #[validate(length(min = 1, message = "External key is required"))]
    pub external_key: String,

    /// Upstream document name
    pub name: Option<String>,
    /// Upstream document number
    pub document_number: Option<String>,
    pub document_date: Option<DateTime<Utc>>,

    /// Explicit operation number; assigned from the per-kind sequence when
    /// absent.
    pub task_number: Option<i64>,

    pub line: Option<String>,
    pub batch_number: Option<String>,
    pub storage: Option<String>,
    pub direction: Option<String>,
    pub shift: Option<String>,
    pub collect_kind: Option<CollectKind>,
    pub parent_task: Option<Uuid>,

    #[serde(default)]
    pub pallets: Vec<PalletItem>,
    #[serde(default)]
    pub products: Vec<ProductLineItem>,
    #[serde(default)]
    pub cells: Vec<CellItem>,
}

/// A pallet to create or attach during task creation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PalletItem {
    /// Internal id, preferred upsert key when present.
    pub id: Option<Uuid>,
    #[validate(length(min = 1, message = "Pallet code is required"))]
    pub code: String,
    pub product: Option<String>,
    pub weight: Option<Decimal>,
    #[validate(range(min = 0, message = "Content count cannot be negative"))]
    pub content_count: Option<i32>,
    pub batch_number: Option<String>,
    pub production_date: Option<NaiveDate>,
    pub series: Option<String>,
    pub pallet_type: Option<String>,
    pub production_shop: Option<String>,
    pub shift: Option<String>,
    /// Pallet shipped in place of this one after a split.
    pub dependent_pallet: Option<String>,
    /// Expected product content (order lines).
    #[serde(default)]
    pub products: Vec<ProductLineItem>,
    /// Scan-derived aggregation codes linking units to this pallet.
    #[serde(default)]
    pub aggregation_codes: Vec<String>,
}

/// A product line attached to a task or a pallet.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProductLineItem {
    #[validate(length(min = 1, message = "Product line external key is required"))]
    pub external_key: String,
    pub product: Option<String>,
    #[validate(range(min = 0, message = "Count cannot be negative"))]
    pub count: i32,
}

/// A cell row attached to a placement/selection task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellItem {
    pub cell: Option<String>,
    pub dest_cell: Option<String>,
    pub pallet: Option<String>,
}

/// Properties patch: partial update, absent fields untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertiesPatch {
    pub status: Option<String>,
    pub unloaded: Option<bool>,
    pub user: Option<Uuid>,
}

impl PropertiesPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.unloaded.is_none() && self.user.is_none()
    }
}

/// Content-change envelope: an optional properties sub-patch plus the
/// kind-specific remainder.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub properties: Option<PropertiesPatch>,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

/// Cell destination fill-in for placement/selection content changes.
#[derive(Debug, Clone, Deserialize)]
pub struct CellContentChange {
    pub cells: Vec<CellDestination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CellDestination {
    pub cell: String,
    pub dest_cell: Option<String>,
    pub pallet: Option<String>,
}

/// Fact quantities and withdrawals for inventory/write-off content changes.
#[derive(Debug, Clone, Deserialize)]
pub struct FactContentChange {
    #[serde(default)]
    pub products: Vec<FactCount>,
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactCount {
    pub external_key: String,
    pub fact_count: i32,
}

/// A quantity taken off a source pallet.
#[derive(Debug, Clone, Deserialize)]
pub struct Withdrawal {
    pub pallet: String,
    pub count: i32,
    #[serde(default)]
    pub weight: Option<Decimal>,
    pub dest_pallet: Option<String>,
    pub product_key: Option<String>,
}

/// Source collection for shipment/pallet-collect content changes.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectContentChange {
    pub sources: Vec<Withdrawal>,
}
