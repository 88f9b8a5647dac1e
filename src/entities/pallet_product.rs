use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered/expected product content of a pallet. `is_collected` flips once
/// the cumulative sourced count for `external_key` reaches `count`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pallet_products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub pallet_id: Uuid,
    pub product_id: Option<Uuid>,

    /// Product-line external key matched against `pallet_sources.product_key`.
    pub external_key: String,

    pub count: i32,
    pub is_collected: bool,
    pub has_divergence: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pallet::Entity",
        from = "Column::PalletId",
        to = "super::pallet::Column::Id"
    )]
    Pallet,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::pallet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pallet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
