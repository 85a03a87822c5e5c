use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A discount campaign; the redeemable codes live in `coupons`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupon_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub discount_type: DiscountType,
    /// Percent (10 = 10%) or a fixed amount, depending on `discount_type`
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub max_discount_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub min_order_amount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Aggregate redemption cap across all codes
    #[sea_orm(nullable)]
    pub max_usage: Option<i32>,
    pub usage_count: i32,
    #[sea_orm(nullable)]
    pub max_usage_per_user: Option<i32>,
    /// Codes are consumed by their first redemption
    pub single_use_codes: bool,
    #[sea_orm(column_type = "Json")]
    pub applicable_products: Json,
    #[sea_orm(column_type = "Json")]
    pub applicable_categories: Json,
    #[sea_orm(column_type = "Json")]
    pub applicable_sellers: Json,
    /// Owning seller for seller-issued campaigns
    #[sea_orm(nullable)]
    pub seller_id: Option<Uuid>,
    pub funded_by: CouponFunding,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon::Entity")]
    Coupons,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum CouponFunding {
    #[sea_orm(string_value = "seller")]
    Seller,
    #[sea_orm(string_value = "platform")]
    Platform,
}

/// Reads a JSON array of ids, skipping anything that is not a UUID string.
pub fn id_list(value: &Json) -> Vec<Uuid> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect()
        })
        .unwrap_or_default()
}
