use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Content-join row attaching a storage cell (and optionally the pallet in
/// it) to an operation. `dest_cell_id` is filled in by a content change when
/// the worker scans the target cell.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operation_cells")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub operation_id: Uuid,
    pub cell_id: Option<Uuid>,
    pub dest_cell_id: Option<Uuid>,
    pub pallet_id: Option<Uuid>,

    // snapshot fields, stamped once at creation
    pub op_kind: String,
    pub op_number: i64,
    pub source_name: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::operation::Entity",
        from = "Column::OperationId",
        to = "super::operation::Column::Id"
    )]
    Operation,
    #[sea_orm(
        belongs_to = "super::storage_cell::Entity",
        from = "Column::CellId",
        to = "super::storage_cell::Column::Id"
    )]
    Cell,
    #[sea_orm(
        belongs_to = "super::pallet::Entity",
        from = "Column::PalletId",
        to = "super::pallet::Column::Id"
    )]
    Pallet,
}

impl Related<super::operation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
