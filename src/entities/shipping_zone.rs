use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rate table row for one delivery zone
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipping_zones")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub base_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub per_kg_rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub express_multiplier: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub same_day_multiplier: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub fragile_surcharge: Decimal,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
