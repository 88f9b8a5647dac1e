use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical collection unit. `content_count` and `weight` track what is
/// still on the pallet; withdrawals that exhaust it archive the row with
/// both quantities clamped to zero.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// External human-readable code; upsert key for `create_pallets`.
    #[sea_orm(unique)]
    pub code: String,

    pub product_id: Option<Uuid>,
    pub status: String,
    pub weight: Decimal,
    pub content_count: i32,
    pub pallet_type: String,

    pub batch_number: Option<String>,
    pub production_date: Option<Date>,
    pub series: Option<String>,
    pub shift_id: Option<Uuid>,
    pub production_shop: Option<String>,

    /// Set by a closing selection task; a later placement must filter
    /// against this task key.
    pub external_task_key: Option<String>,

    /// Collect operation that produced this pallet; parent for DIVIDED splits.
    pub collect_task_id: Option<Uuid>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::pallet_product::Entity")]
    PalletProducts,
    #[sea_orm(has_many = "super::pallet_source::Entity")]
    PalletSources,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::pallet_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PalletProducts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
