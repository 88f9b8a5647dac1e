use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only ledger row: a quantity withdrawn from a source pallet into a
/// destination pallet or consumed by an operation. Never mutated after
/// creation; aggregation queries over this table are the source of truth for
/// "how many boxes came from where".
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pallet_sources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub pallet_id: Uuid,
    pub dest_pallet_id: Option<Uuid>,
    pub count: i32,
    pub weight: Decimal,

    /// Withdrawal reason (`CollectKind`).
    pub collect_kind: String,

    /// Product-line external key; groups ledger rows for order aggregation.
    pub product_key: Option<String>,

    pub related_task_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pallet::Entity",
        from = "Column::PalletId",
        to = "super::pallet::Column::Id"
    )]
    Pallet,
}

impl Related<super::pallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
