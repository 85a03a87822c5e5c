use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One redeemable code within a batch
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Stored upper-case
    #[sea_orm(unique)]
    pub code: String,
    /// Only this user may redeem the code
    #[sea_orm(nullable)]
    pub recipient_id: Option<Uuid>,
    pub used: bool,
    #[sea_orm(nullable)]
    pub used_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub used_by: Option<Uuid>,
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    pub usage_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::coupon_batch::Entity",
        from = "Column::BatchId",
        to = "super::coupon_batch::Column::Id"
    )]
    Batch,
}

impl Related<super::coupon_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
