use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only ledger of cell occupancy events. Current occupancy of a cell
/// is the latest row for it; there is no mutable "current pallet" column.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_cell_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub cell_id: Uuid,
    pub pallet_id: Uuid,
    pub operation_id: Uuid,
    pub state: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
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

impl Related<super::storage_cell::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cell.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
