//! Read model for a single order: the order row with its lines, seller
//! slices and status history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, DeliveryMethod, DeliverySpeed, OrderStatus, PaymentMethod, PaymentStatus},
        order_item, order_tracking_event,
        seller_order::{self, PayoutStatus},
    },
    errors::ServiceError,
    money::{round_display, round_money},
    services::{stock::StockLine, tax::VatCollector},
};

const RATE_DP: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderItemView {
    pub id: Uuid,
    pub seller_order_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: Option<String>,
    pub product_name: String,
    #[schema(value_type = Option<Object>)]
    pub variant_attributes: Option<serde_json::Value>,
    pub quantity: i32,
    /// VAT-inclusive price of one unit
    pub unit_price: Decimal,
    pub base_price: Decimal,
    pub vat_amount: Decimal,
    pub vat_rate: Decimal,
    pub vat_collector: VatCollector,
    pub line_total: Decimal,
}

impl From<order_item::Model> for OrderItemView {
    fn from(m: order_item::Model) -> Self {
        Self {
            id: m.id,
            seller_order_id: m.seller_order_id,
            seller_id: m.seller_id,
            product_id: m.product_id,
            variant_id: m.variant_id,
            sku: m.sku,
            product_name: m.product_name,
            variant_attributes: m.variant_attributes,
            quantity: m.quantity,
            unit_price: round_money(m.unit_price),
            base_price: round_money(m.base_price),
            vat_amount: round_money(m.vat_amount),
            vat_rate: m.vat_rate.round_dp(RATE_DP),
            vat_collector: m.vat_collector,
            line_total: round_money(m.line_total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SellerOrderView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub item_ids: Vec<Uuid>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub platform_funded_discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax_total: Decimal,
    pub vat_collector: VatCollector,
    pub total: Decimal,
    pub commission_rate: Decimal,
    pub commission: Decimal,
    pub commission_vat: Decimal,
    pub payout_amount: Decimal,
    pub payout_status: PayoutStatus,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
}

impl From<seller_order::Model> for SellerOrderView {
    fn from(m: seller_order::Model) -> Self {
        Self {
            id: m.id,
            order_id: m.order_id,
            seller_id: m.seller_id,
            item_ids: serde_json::from_value(m.item_ids).unwrap_or_default(),
            subtotal: round_money(m.subtotal),
            discount: round_money(m.discount),
            platform_funded_discount: round_money(m.platform_funded_discount),
            shipping_fee: round_money(m.shipping_fee),
            tax_total: round_money(m.tax_total),
            vat_collector: m.vat_collector,
            total: round_money(m.total),
            commission_rate: m.commission_rate.round_dp(RATE_DP),
            commission: round_money(m.commission),
            commission_vat: round_money(m.commission_vat),
            payout_amount: round_money(m.payout_amount),
            payout_status: m.payout_status,
            delivery_method: m.delivery_method,
            status: m.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TrackingEntry {
    pub sequence: i32,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub actor_role: String,
    pub created_at: DateTime<Utc>,
}

impl From<order_tracking_event::Model> for TrackingEntry {
    fn from(m: order_tracking_event::Model) -> Self {
        Self {
            sequence: m.sequence,
            status: m.status,
            note: m.note,
            actor_id: m.actor_id,
            actor_role: m.actor_role,
            created_at: m.created_at,
        }
    }
}

/// An order as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub id: Uuid,
    pub order_number: String,
    pub tracking_number: String,
    pub buyer_id: Uuid,
    pub address_id: Uuid,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    /// `total` in whole currency units, for display only
    pub display_total: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub delivery_speed: DeliverySpeed,
    pub pickup_center_id: Option<Uuid>,
    pub current_status: OrderStatus,
    pub coupon_code: Option<String>,
    pub stock_reduced: bool,
    pub revenue_credited: bool,
    pub is_archived: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
    pub seller_orders: Vec<SellerOrderView>,
    pub tracking: Vec<TrackingEntry>,
}

impl OrderDetail {
    /// Stock movements that reverse or repeat this order's decrement.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|item| StockLine {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                label: item.sku.clone().unwrap_or_else(|| item.product_name.clone()),
            })
            .collect()
    }

    pub fn seller_ids(&self) -> Vec<Uuid> {
        self.seller_orders.iter().map(|s| s.seller_id).collect()
    }
}

pub async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Loads the full read model. Lines come back in cart order, seller slices
/// in creation order and history by sequence.
pub async fn load_order_detail<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderDetail, ServiceError> {
    let order = load_order(conn, order_id).await?;

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Position)
        .all(conn)
        .await?;

    let slice_order: Vec<Uuid> =
        serde_json::from_value(order.seller_order_ids.clone()).unwrap_or_default();
    let mut slices = seller_order::Entity::find()
        .filter(seller_order::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    slices.sort_by_key(|s| {
        slice_order
            .iter()
            .position(|id| *id == s.id)
            .unwrap_or(usize::MAX)
    });

    let tracking = order_tracking_event::Entity::find()
        .filter(order_tracking_event::Column::OrderId.eq(order_id))
        .order_by_asc(order_tracking_event::Column::Sequence)
        .all(conn)
        .await?;

    let total = round_money(order.total);
    Ok(OrderDetail {
        id: order.id,
        order_number: order.order_number,
        tracking_number: order.tracking_number,
        buyer_id: order.buyer_id,
        address_id: order.address_id,
        shipping_address: order.shipping_address,
        subtotal: round_money(order.subtotal),
        discount: round_money(order.discount),
        shipping_fee: round_money(order.shipping_fee),
        tax_total: round_money(order.tax_total),
        total,
        display_total: round_display(total),
        currency: order.currency,
        payment_method: order.payment_method,
        payment_status: order.payment_status,
        payment_reference: order.payment_reference,
        delivery_method: order.delivery_method,
        delivery_speed: order.delivery_speed,
        pickup_center_id: order.pickup_center_id,
        current_status: order.current_status,
        coupon_code: order.coupon_code,
        stock_reduced: order.stock_reduced,
        revenue_credited: order.revenue_credited,
        is_archived: order.is_archived,
        version: order.version,
        created_at: order.created_at,
        updated_at: order.updated_at,
        items: items.into_iter().map(OrderItemView::from).collect(),
        seller_orders: slices.into_iter().map(SellerOrderView::from).collect(),
        tracking: tracking.into_iter().map(TrackingEntry::from).collect(),
    })
}
