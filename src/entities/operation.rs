use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of warehouse or production work. Every task kind shares this
/// shape; `kind` selects the behavior bundle through the router.
///
/// Flag invariant: `unloaded` implies `ready_to_unload` implies `closed`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Per-kind monotonic sequence, assigned at creation when not supplied.
    pub number: i64,
    pub kind: String,
    pub date: DateTimeUtc,
    pub status: String,
    pub closed: bool,
    pub ready_to_unload: bool,
    pub unloaded: bool,

    pub external_source_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,

    /// Subtype of a pallet-collect task; selects the parent-cascade target.
    pub collect_kind: Option<String>,

    pub line: Option<String>,
    pub batch_number: Option<String>,
    pub storage_key: Option<String>,
    pub direction_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::external_source::Entity",
        from = "Column::ExternalSourceId",
        to = "super::external_source::Column::Id"
    )]
    ExternalSource,
    #[sea_orm(has_many = "super::operation_pallet::Entity")]
    OperationPallets,
    #[sea_orm(has_many = "super::operation_product::Entity")]
    OperationProducts,
    #[sea_orm(has_many = "super::operation_cell::Entity")]
    OperationCells,
}

impl Related<super::external_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExternalSource.def()
    }
}

impl Related<super::operation_pallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OperationPallets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
