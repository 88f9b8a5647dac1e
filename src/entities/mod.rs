//! SeaORM entities for the warehouse execution core.
//!
//! One `operations` table backs every task kind; content-join rows attach
//! pallets/products/cells to an operation with denormalized snapshot fields.

pub mod aggregation_code;
pub mod app_user;
pub mod external_source;
pub mod operation;
pub mod operation_cell;
pub mod operation_pallet;
pub mod operation_product;
pub mod pallet;
pub mod pallet_product;
pub mod pallet_source;
pub mod product;
pub mod shift;
pub mod storage;
pub mod storage_cell;
pub mod storage_cell_state;

use crate::domain::OperationKind;

/// Denormalized operation metadata stamped onto content-join rows at
/// creation (`fill_properties` semantics): set once, immutable afterwards.
#[derive(Debug, Clone)]
pub struct ContentProps {
    pub op_kind: String,
    pub op_number: i64,
    pub source_name: Option<String>,
}

impl ContentProps {
    pub fn for_operation(op: &operation::Model, source_name: Option<String>) -> Self {
        Self {
            op_kind: op.kind.clone(),
            op_number: op.number,
            source_name,
        }
    }
}

impl operation::Model {
    pub fn kind(&self) -> Option<OperationKind> {
        self.kind.parse().ok()
    }
}
