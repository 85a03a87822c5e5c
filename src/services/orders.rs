use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        address,
        order::{self, DeliveryMethod, DeliverySpeed, OrderStatus, PaymentMethod, PaymentStatus},
        order_deletion_audit, order_item, order_tracking_event, product, seller,
        seller_order::{self, PayoutStatus},
        wishlist_item,
    },
    errors::ServiceError,
    events::{Event, EventSender, Recipient},
    money::{round_display, round_money},
    services::{
        coupons::{apply_coupon_to_order, validate_coupon, CouponCart, CouponLine, CouponQuote},
        order_detail::{load_order, load_order_detail, OrderDetail},
        order_status::{check_transition, transition_effects, OrderFlags},
        pricing::{price_cart, CartLine, PricedCart, PricedLine},
        seller_split::{split_seller_orders, CommissionPolicy, DiscountTerms, SellerOrderDraft},
        shipping::{calculate_shipping_quote, ShippingItem, ShippingQuote, ShippingRequest, ShippingSettings},
        stock::{reduce_order_stock, restore_order_stock, StockLine},
        tax::TaxRates,
        wallet, Clock, SystemClock,
    },
};

const MAX_CART_LINES: u64 = 100;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Marketplace settings the order pipeline reads. Built from configuration
/// and injected, so tests can substitute any value.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub currency: String,
    pub tax: TaxRates,
    pub commission: CommissionPolicy,
    pub shipping: ShippingSettings,
    /// Seller that owns platform products
    pub platform_store_seller_id: Option<Uuid>,
    pub price_tolerance: Decimal,
    /// Upper bound on the order-creation transaction
    pub transaction_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Buyer,
    Seller,
    Admin,
    System,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Buyer => "buyer",
            ActorRole::Seller => "seller",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        }
    }

    fn is_staff(&self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::System)
    }
}

/// The authenticated caller of an order operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn buyer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Buyer,
        }
    }

    pub fn seller(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Seller,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Admin,
        }
    }
}

fn default_quantity() -> i64 {
    1
}

fn default_delivery_method() -> DeliveryMethod {
    DeliveryMethod::Dispatch
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    /// Product id
    pub product: Uuid,
    #[serde(default)]
    pub sku: Option<String>,
    /// Clamped to 1..=999
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Price the client displayed; never charged
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub order_items: Vec<OrderItemRequest>,
    /// Id of one of the buyer's saved addresses
    pub address: Uuid,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub coupon_code: Option<String>,
    #[serde(default = "default_delivery_method")]
    pub delivery_method: DeliveryMethod,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_speed: DeliverySpeed,
    #[serde(default)]
    pub pickup_center_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    /// Canonical or legacy status name
    #[validate(length(min = 1))]
    pub status: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub note: Option<String>,
    /// Rejects the change when the order has moved on since it was read
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: Option<String>,
    pub product_name: String,
    pub seller_id: Uuid,
    pub quantity: i32,
    pub base_price: Decimal,
    pub vat_amount: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<&PricedLine> for QuoteLine {
    fn from(line: &PricedLine) -> Self {
        Self {
            product_id: line.product.id,
            variant_id: line.variant.as_ref().map(|v| v.id),
            sku: line.variant.as_ref().map(|v| v.sku.clone()),
            product_name: line.product.name.clone(),
            seller_id: line.seller_id,
            quantity: line.quantity,
            base_price: line.tax.base_price,
            vat_amount: line.tax.vat_amount,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

/// Dry-run pricing of a cart; nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartQuote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub display_total: Decimal,
    pub currency: String,
    pub lines: Vec<QuoteLine>,
    pub coupon: Option<CouponQuote>,
    pub shipping: ShippingQuote,
    pub seller_orders: Vec<SellerOrderDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Buyer cancellation: the order is kept, cancelled and archived
    Cancelled { order: Box<OrderDetail> },
    /// Admin removal: the order is gone, a snapshot is kept in the audit log
    Deleted { order_id: Uuid, order_number: String },
}

/// Everything computed for a cart before anything is written.
struct Checkout {
    address: address::Model,
    cart: PricedCart,
    coupon: Option<CouponQuote>,
    shipping: ShippingQuote,
    drafts: Vec<SellerOrderDraft>,
    subtotal: Decimal,
    discount: Decimal,
    shipping_fee: Decimal,
    tax_total: Decimal,
    total: Decimal,
}

impl Checkout {
    fn stock_lines(&self) -> Vec<StockLine> {
        self.cart
            .lines
            .iter()
            .map(|line| StockLine {
                product_id: line.product.id,
                variant_id: line.variant.as_ref().map(|v| v.id),
                quantity: line.quantity,
                label: line.label(),
            })
            .collect()
    }
}

/// How checkout left the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settlement {
    status: OrderStatus,
    payment_status: PaymentStatus,
    reference: Option<String>,
    /// Settled payments take stock inside the creation transaction
    reduce_stock: bool,
}

fn pay_on_delivery() -> Settlement {
    Settlement {
        status: OrderStatus::PendingPayment,
        payment_status: PaymentStatus::Pending,
        reference: None,
        reduce_stock: false,
    }
}

fn pay_via_gateway() -> Settlement {
    // Charged by the gateway later; confirmed through `confirm_payment`.
    Settlement {
        status: OrderStatus::PendingPayment,
        payment_status: PaymentStatus::Pending,
        reference: None,
        reduce_stock: false,
    }
}

async fn pay_from_balance<C: ConnectionTrait>(
    conn: &C,
    buyer_id: Uuid,
    amount: Decimal,
    order_number: &str,
) -> Result<Settlement, ServiceError> {
    let reference = format!("order:{}", order_number);
    if amount > Decimal::ZERO {
        wallet::debit(
            conn,
            buyer_id,
            amount,
            &reference,
            &format!("Payment for order {}", order_number),
        )
        .await?;
    }
    Ok(Settlement {
        status: OrderStatus::Confirmed,
        payment_status: PaymentStatus::Paid,
        reference: Some(reference),
        reduce_stock: true,
    })
}

/// A requested status change and what should be recorded with it.
#[derive(Debug, Clone)]
struct StatusChange {
    target: OrderStatus,
    actor: Actor,
    note: Option<String>,
    archive: bool,
    mark_paid: bool,
    payment_reference: Option<String>,
}

impl StatusChange {
    fn to(target: OrderStatus, actor: Actor) -> Self {
        Self {
            target,
            actor,
            note: None,
            archive: false,
            mark_paid: false,
            payment_reference: None,
        }
    }
}

fn random_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// `ORD-YYYYMMDD-XXXXXX`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.format("%Y%m%d"), random_code(6))
}

/// `TRK-XXXXXXXXXX`
pub fn generate_tracking_number() -> String {
    format!("TRK-{}", random_code(10))
}

/// Order creation, lifecycle and removal.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    settings: Arc<OrderSettings>,
    clock: Arc<dyn Clock>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: OrderSettings,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            clock: Arc::new(SystemClock),
            event_sender,
        }
    }

    /// Replaces the wall clock, for cutoff and expiry tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event);
        }
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction");
            ServiceError::DatabaseError(e)
        })
    }

    /// Commits on success, rolls back on failure.
    async fn finish<T>(
        &self,
        txn: DatabaseTransaction,
        outcome: Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        match outcome {
            Ok(value) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %e, "Failed to commit transaction");
                    ServiceError::DatabaseError(e)
                })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Failed to roll back transaction");
                }
                Err(err)
            }
        }
    }

    /// Prices a cart exactly as order creation would, without writing.
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn validate_cart(
        &self,
        buyer_id: Uuid,
        request: &CreateOrderRequest,
    ) -> Result<CartQuote, ServiceError> {
        let checkout = self
            .build_checkout(&*self.db, buyer_id, request, self.clock.now())
            .await?;
        Ok(CartQuote {
            subtotal: checkout.subtotal,
            discount: checkout.discount,
            shipping_fee: checkout.shipping_fee,
            tax_total: checkout.tax_total,
            total: checkout.total,
            display_total: round_display(checkout.total),
            currency: self.settings.currency.clone(),
            lines: checkout.cart.lines.iter().map(QuoteLine::from).collect(),
            coupon: checkout.coupon,
            shipping: checkout.shipping,
            seller_orders: checkout.drafts,
        })
    }

    /// Creates an order in one transaction: prices every line from the
    /// catalog, applies the coupon, quotes shipping, splits the order per
    /// seller, settles stored-balance payments and takes stock. Nothing is
    /// left behind when any step fails.
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id, payment_method = ?request.payment_method))]
    pub async fn create_order(
        &self,
        buyer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;

        let created = tokio::time::timeout(
            self.settings.transaction_timeout,
            self.create_in_transaction(buyer_id, &request),
        )
        .await;

        let order_id = match created {
            Ok(Ok(order_id)) => order_id,
            Ok(Err(err)) => {
                counter!("marketplace.orders.failed", 1);
                if err.is_client_error() {
                    info!(error = %err, "order rejected");
                } else {
                    error!(error = %err, "order creation failed");
                }
                return Err(err);
            }
            Err(_) => {
                counter!("marketplace.orders.failed", 1);
                error!(timeout = ?self.settings.transaction_timeout, "order creation timed out");
                return Err(ServiceError::OrderCreationTimeout);
            }
        };

        counter!("marketplace.orders.created", 1);
        let detail = load_order_detail(&*self.db, order_id).await?;
        self.after_create(&detail).await;
        info!(order_id = %detail.id, order_number = %detail.order_number, total = %detail.total, "order created");
        Ok(detail)
    }

    async fn create_in_transaction(
        &self,
        buyer_id: Uuid,
        request: &CreateOrderRequest,
    ) -> Result<Uuid, ServiceError> {
        let txn = self.begin().await?;
        let outcome = self.persist_new_order(&txn, buyer_id, request).await;
        self.finish(txn, outcome).await
    }

    async fn persist_new_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        buyer_id: Uuid,
        request: &CreateOrderRequest,
    ) -> Result<Uuid, ServiceError> {
        let now = self.clock.now();
        let checkout = self.build_checkout(conn, buyer_id, request, now).await?;

        let order_id = Uuid::new_v4();
        let order_number = generate_order_number(now);

        let settlement = match request.payment_method {
            PaymentMethod::PayOnDelivery => pay_on_delivery(),
            PaymentMethod::StoredBalance => {
                pay_from_balance(conn, buyer_id, checkout.total, &order_number).await?
            }
            PaymentMethod::ExternalGateway => pay_via_gateway(),
        };

        let slice_ids: Vec<Uuid> = checkout.drafts.iter().map(|_| Uuid::new_v4()).collect();
        let item_ids: Vec<Uuid> = checkout.cart.lines.iter().map(|_| Uuid::new_v4()).collect();
        let mut slice_of_line = vec![Uuid::nil(); checkout.cart.lines.len()];
        for (draft, slice_id) in checkout.drafts.iter().zip(&slice_ids) {
            for &idx in &draft.line_indexes {
                slice_of_line[idx] = *slice_id;
            }
        }

        let address = &checkout.address;
        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            tracking_number: Set(generate_tracking_number()),
            buyer_id: Set(buyer_id),
            address_id: Set(address.id),
            shipping_address: Set(json!({
                "recipient_name": address.recipient_name,
                "phone": address.phone,
                "street": address.street,
                "area": address.area,
                "city": address.city,
                "region": address.region,
            })),
            subtotal: Set(checkout.subtotal),
            discount: Set(checkout.discount),
            shipping_fee: Set(checkout.shipping_fee),
            tax_total: Set(checkout.tax_total),
            total: Set(checkout.total),
            currency: Set(self.settings.currency.clone()),
            payment_method: Set(request.payment_method),
            payment_status: Set(settlement.payment_status),
            payment_reference: Set(settlement.reference.clone()),
            delivery_method: Set(request.delivery_method),
            delivery_speed: Set(request.delivery_speed),
            pickup_center_id: Set(request.pickup_center_id),
            current_status: Set(settlement.status),
            coupon_code: Set(checkout.coupon.as_ref().map(|q| q.code.clone())),
            coupon_id: Set(checkout.coupon.as_ref().map(|q| q.coupon_id)),
            seller_order_ids: Set(json!(slice_ids)),
            stock_reduced: Set(settlement.reduce_stock),
            revenue_credited: Set(false),
            is_archived: Set(false),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        for (draft, slice_id) in checkout.drafts.iter().zip(&slice_ids) {
            let slice_items: Vec<Uuid> = draft.line_indexes.iter().map(|&i| item_ids[i]).collect();
            seller_order::ActiveModel {
                id: Set(*slice_id),
                order_id: Set(order_id),
                seller_id: Set(draft.seller_id),
                item_ids: Set(json!(slice_items)),
                subtotal: Set(draft.subtotal),
                discount: Set(draft.discount),
                platform_funded_discount: Set(draft.platform_funded_discount),
                shipping_fee: Set(draft.shipping_fee),
                tax_total: Set(draft.tax_total),
                vat_collector: Set(draft.vat_collector),
                total: Set(draft.total),
                commission_rate: Set(draft.commission_rate),
                commission: Set(draft.commission),
                commission_vat: Set(draft.commission_vat),
                payout_amount: Set(draft.payout_amount),
                payout_status: Set(PayoutStatus::Pending),
                delivery_method: Set(request.delivery_method),
                status: Set(settlement.status),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?;
        }

        for (position, (line, item_id)) in checkout.cart.lines.iter().zip(&item_ids).enumerate() {
            order_item::ActiveModel {
                id: Set(*item_id),
                order_id: Set(order_id),
                seller_order_id: Set(slice_of_line[position]),
                seller_id: Set(line.seller_id),
                product_id: Set(line.product.id),
                variant_id: Set(line.variant.as_ref().map(|v| v.id)),
                sku: Set(line.variant.as_ref().map(|v| v.sku.clone())),
                product_name: Set(line.product.name.clone()),
                variant_attributes: Set(line.variant.as_ref().and_then(|v| v.attributes.clone())),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                base_price: Set(line.tax.base_price),
                vat_amount: Set(line.tax.vat_amount),
                vat_rate: Set(line.tax.vat_rate),
                vat_collector: Set(line.vat_collector),
                line_total: Set(line.line_total),
                position: Set(position as i32),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;
        }

        append_tracking(
            conn,
            order_id,
            settlement.status,
            Some("Order placed".to_string()),
            Actor::buyer(buyer_id),
            now,
        )
        .await?;

        if let Some(quote) = &checkout.coupon {
            apply_coupon_to_order(conn, quote, buyer_id, order_id, checkout.discount, now).await?;
        }

        if settlement.reduce_stock {
            reduce_order_stock(conn, &checkout.stock_lines()).await?;
        }

        Ok(order_id)
    }

    async fn build_checkout<C: ConnectionTrait>(
        &self,
        conn: &C,
        buyer_id: Uuid,
        request: &CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Checkout, ServiceError> {
        request.validate()?;
        if request.order_items.len() as u64 > MAX_CART_LINES {
            return Err(ServiceError::ValidationError(format!(
                "an order can hold at most {} lines",
                MAX_CART_LINES
            )));
        }
        if request.delivery_method == DeliveryMethod::PickupCenter && request.pickup_center_id.is_none()
        {
            return Err(ServiceError::ValidationError(
                "pickupCenterId is required for pickup_center delivery".into(),
            ));
        }

        let address = address::Entity::find_by_id(request.address)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("address {}", request.address)))?;
        if address.user_id != buyer_id {
            return Err(ServiceError::Forbidden(
                "shipping address belongs to another user".into(),
            ));
        }

        let cart_lines: Vec<CartLine> = request
            .order_items
            .iter()
            .map(|item| CartLine {
                product_id: item.product,
                sku: item.sku.clone(),
                quantity: item.quantity,
                client_price: item.price,
            })
            .collect();
        let cart = price_cart(
            conn,
            &cart_lines,
            &self.settings.tax,
            self.settings.platform_store_seller_id,
            self.settings.price_tolerance,
        )
        .await?;
        let subtotal = cart.subtotal();
        let tax_total = cart.tax_total();

        let coupon = match request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => {
                let scope = CouponCart {
                    user_id: buyer_id,
                    subtotal,
                    lines: cart
                        .lines
                        .iter()
                        .map(|l| CouponLine {
                            product_id: l.product.id,
                            category_id: l.product.category_id,
                            seller_id: l.seller_id,
                            amount: l.line_total,
                        })
                        .collect(),
                };
                Some(validate_coupon(conn, code, &scope, now).await?)
            }
            None => None,
        };

        let shipping_items: Vec<ShippingItem> = cart
            .lines
            .iter()
            .map(|l| ShippingItem {
                seller_id: l.seller_id,
                weight_kg: l.product.weight_kg,
                quantity: l.quantity,
                is_fragile: l.product.is_fragile,
            })
            .collect();
        let shipping = calculate_shipping_quote(
            conn,
            &self.settings.shipping,
            &ShippingRequest {
                city: &address.city,
                area: address.area.as_deref(),
                items: &shipping_items,
                delivery_method: request.delivery_method,
                pickup_center_id: request.pickup_center_id,
                speed: request.delivery_speed,
                now,
            },
        )
        .await?;

        let terms = coupon
            .as_ref()
            .map(|q| DiscountTerms {
                amount: q.discount,
                eligible: Some(q.eligible_by_seller.clone()),
                platform_funded: q.platform_funded(),
            })
            .unwrap_or_default();
        let split_lines: Vec<_> = cart.lines.iter().map(PricedLine::split_line).collect();
        let drafts = split_seller_orders(
            &split_lines,
            &terms,
            &shipping,
            &self.settings.commission,
            &cart.commission_overrides(),
        );

        let discount = round_money(drafts.iter().map(|d| d.discount).sum());
        let shipping_fee = shipping.total_shipping_fee;
        let total = round_money(subtotal - discount + shipping_fee);

        Ok(Checkout {
            address,
            cart,
            coupon,
            shipping,
            drafts,
            subtotal,
            discount,
            shipping_fee,
            tax_total,
            total,
        })
    }

    /// Best-effort work after the order has committed. Failures are logged.
    async fn after_create(&self, detail: &OrderDetail) {
        let db = &*self.db;
        for item in &detail.items {
            if let Err(e) = product::Entity::update_many()
                .col_expr(
                    product::Column::TotalSold,
                    Expr::col(product::Column::TotalSold).add(item.quantity),
                )
                .filter(product::Column::Id.eq(item.product_id))
                .exec(db)
                .await
            {
                warn!(error = %e, product_id = %item.product_id, "failed to bump total sold");
            }
        }

        let product_ids = distinct(detail.items.iter().map(|i| i.product_id));
        if let Err(e) = wishlist_item::Entity::delete_many()
            .filter(wishlist_item::Column::UserId.eq(detail.buyer_id))
            .filter(wishlist_item::Column::ProductId.is_in(product_ids))
            .exec(db)
            .await
        {
            warn!(error = %e, order_id = %detail.id, "failed to clean up wishlist");
        }

        self.emit(Event::OrderCreated {
            order_id: detail.id,
            order_number: detail.order_number.clone(),
            buyer_id: detail.buyer_id,
            seller_ids: detail.seller_ids(),
            total: detail.total,
        });
        self.emit(Event::NotificationRequested {
            recipient: Recipient::Buyer(detail.buyer_id),
            order_id: detail.id,
            title: format!("Order {} received", detail.order_number),
        });
        for seller_id in detail.seller_ids() {
            self.emit(Event::NotificationRequested {
                recipient: Recipient::Seller(seller_id),
                order_id: detail.id,
                title: format!("New order {}", detail.order_number),
            });
        }
        self.emit(Event::NotificationRequested {
            recipient: Recipient::Admins,
            order_id: detail.id,
            title: format!("Order {} placed", detail.order_number),
        });
        self.emit(Event::ConfirmationEmailRequested {
            buyer_id: detail.buyer_id,
            order_id: detail.id,
            order_number: detail.order_number.clone(),
        });
    }

    /// Buyer, admin, or a seller with a slice of the order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid, actor: Actor) -> Result<OrderDetail, ServiceError> {
        let detail = load_order_detail(&*self.db, order_id).await?;
        let allowed = match actor.role {
            ActorRole::Admin | ActorRole::System => true,
            ActorRole::Buyer => detail.buyer_id == actor.user_id,
            ActorRole::Seller => detail.seller_ids().contains(&actor.user_id),
        };
        if !allowed {
            return Err(ServiceError::Forbidden("order belongs to another user".into()));
        }
        Ok(detail)
    }

    /// Moves an order along its lifecycle and runs the side effects the move
    /// owes. Requests for the current status change nothing.
    #[instrument(skip(self, request), fields(order_id = %order_id, status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        actor: Actor,
        request: UpdateOrderStatusRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        let target = OrderStatus::normalize(&request.status).ok_or_else(|| {
            ServiceError::ValidationError(format!("unknown order status '{}'", request.status))
        })?;

        let txn = self.begin().await?;
        let outcome: Result<_, ServiceError> = async {
            let order = load_order(&txn, order_id).await?;
            self.authorize_transition(&txn, &order, actor, target).await?;
            if let Some(expected) = request.expected_version {
                if expected != order.version {
                    return Err(ServiceError::ConcurrentModification(order_id));
                }
            }
            let mut change = StatusChange::to(target, actor);
            change.note = request.note.clone();
            self.apply_transition(&txn, order, change).await
        }
        .await;
        let moved = self.finish(txn, outcome).await?;

        if let Some((from, to)) = moved {
            self.after_transition(order_id, from, to).await;
        }
        load_order_detail(&*self.db, order_id).await
    }

    /// Records a deferred payment: `pending_payment -> confirmed`, payment
    /// marked paid and stock taken, in one transaction.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        actor: Actor,
        request: ConfirmPaymentRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        if !actor.role.is_staff() {
            return Err(ServiceError::Forbidden(
                "only staff can confirm payments".into(),
            ));
        }

        let txn = self.begin().await?;
        let outcome: Result<_, ServiceError> = async {
            let order = load_order(&txn, order_id).await?;
            if order.payment_status == PaymentStatus::Paid
                && order.payment_reference.as_deref() == Some(request.reference.as_str())
            {
                return Ok(None);
            }
            if order.current_status != OrderStatus::PendingPayment
                || order.payment_status != PaymentStatus::Pending
            {
                return Err(ServiceError::InvalidTransition(format!(
                    "order {} is {} and cannot take a payment",
                    order.order_number, order.current_status
                )));
            }
            let mut change = StatusChange::to(OrderStatus::Confirmed, actor);
            change.note = Some("Payment confirmed".into());
            change.mark_paid = true;
            change.payment_reference = Some(request.reference.clone());
            self.apply_transition(&txn, order, change).await
        }
        .await;
        let moved = self.finish(txn, outcome).await?;

        if let Some((from, to)) = moved {
            self.emit(Event::PaymentConfirmed {
                order_id,
                reference: request.reference.clone(),
            });
            self.after_transition(order_id, from, to).await;
        }
        load_order_detail(&*self.db, order_id).await
    }

    /// Buyers cancel and archive orders that have not shipped; admins remove
    /// the order entirely, keeping a snapshot in the deletion audit log.
    #[instrument(skip(self), fields(order_id = %order_id, role = ?actor.role))]
    pub async fn cancel_or_delete(
        &self,
        order_id: Uuid,
        actor: Actor,
    ) -> Result<DeleteOutcome, ServiceError> {
        match actor.role {
            ActorRole::Admin => self.hard_delete(order_id, actor).await,
            ActorRole::Buyer => self.cancel_by_buyer(order_id, actor).await,
            ActorRole::Seller | ActorRole::System => Err(ServiceError::Forbidden(
                "only the buyer or an admin can remove an order".into(),
            )),
        }
    }

    async fn cancel_by_buyer(&self, order_id: Uuid, actor: Actor) -> Result<DeleteOutcome, ServiceError> {
        let txn = self.begin().await?;
        let outcome: Result<_, ServiceError> = async {
            let order = load_order(&txn, order_id).await?;
            if order.buyer_id != actor.user_id {
                return Err(ServiceError::Forbidden("order belongs to another user".into()));
            }
            if !order.current_status.is_cancellable_by_buyer() {
                return Err(ServiceError::InvalidTransition(format!(
                    "order {} is {} and can no longer be cancelled",
                    order.order_number, order.current_status
                )));
            }
            let mut change = StatusChange::to(OrderStatus::Cancelled, actor);
            change.note = Some("Cancelled by buyer".into());
            change.archive = true;
            self.apply_transition(&txn, order, change).await
        }
        .await;
        let moved = self.finish(txn, outcome).await?;

        if let Some((from, to)) = moved {
            self.after_transition(order_id, from, to).await;
        }
        let detail = load_order_detail(&*self.db, order_id).await?;
        Ok(DeleteOutcome::Cancelled {
            order: Box::new(detail),
        })
    }

    async fn hard_delete(&self, order_id: Uuid, actor: Actor) -> Result<DeleteOutcome, ServiceError> {
        let txn = self.begin().await?;
        let outcome: Result<_, ServiceError> = async {
            let detail = load_order_detail(&txn, order_id).await?;
            let now = self.clock.now();

            if detail.revenue_credited {
                reverse_seller_revenue(&txn, order_id, now).await?;
            }
            let goods_left = matches!(
                detail.current_status,
                OrderStatus::Delivered | OrderStatus::Refunded
            );
            if detail.stock_reduced && !goods_left {
                restore_order_stock(&txn, &detail.stock_lines()).await?;
            }

            let snapshot = serde_json::to_value(&detail)
                .map_err(|e| ServiceError::InternalError(format!("order snapshot: {}", e)))?;
            order_deletion_audit::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                order_number: Set(detail.order_number.clone()),
                deleted_by: Set(actor.user_id),
                snapshot: Set(snapshot),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;

            order_tracking_event::Entity::delete_many()
                .filter(order_tracking_event::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await?;
            order_item::Entity::delete_many()
                .filter(order_item::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await?;
            seller_order::Entity::delete_many()
                .filter(seller_order::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await?;
            order::Entity::delete_by_id(order_id).exec(&txn).await?;

            Ok(detail.order_number)
        }
        .await;
        let order_number = self.finish(txn, outcome).await?;

        warn!(%order_id, %order_number, deleted_by = %actor.user_id, "order deleted by admin");
        self.emit(Event::OrderDeleted {
            order_id,
            order_number: order_number.clone(),
            deleted_by: actor.user_id,
        });
        Ok(DeleteOutcome::Deleted {
            order_id,
            order_number,
        })
    }

    async fn authorize_transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        actor: Actor,
        target: OrderStatus,
    ) -> Result<(), ServiceError> {
        match actor.role {
            ActorRole::Admin | ActorRole::System => Ok(()),
            ActorRole::Seller => {
                let slices = seller_order::Entity::find()
                    .filter(seller_order::Column::OrderId.eq(order.id))
                    .filter(seller_order::Column::SellerId.eq(actor.user_id))
                    .count(conn)
                    .await?;
                if slices == 0 {
                    return Err(ServiceError::Forbidden("order has no items from this seller".into()));
                }
                if target == OrderStatus::Refunded {
                    return Err(ServiceError::Forbidden("refunds are issued by staff".into()));
                }
                Ok(())
            }
            ActorRole::Buyer => {
                if order.buyer_id != actor.user_id {
                    return Err(ServiceError::Forbidden("order belongs to another user".into()));
                }
                if target != OrderStatus::Cancelled {
                    return Err(ServiceError::Forbidden("buyers can only cancel orders".into()));
                }
                if !order.current_status.is_cancellable_by_buyer() && order.current_status != target {
                    return Err(ServiceError::InvalidTransition(format!(
                        "order {} is {} and can no longer be cancelled",
                        order.order_number, order.current_status
                    )));
                }
                Ok(())
            }
        }
    }

    /// Applies one transition. Returns the move made, or `None` for a
    /// same-status request.
    async fn apply_transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: order::Model,
        change: StatusChange,
    ) -> Result<Option<(OrderStatus, OrderStatus)>, ServiceError> {
        let from = order.current_status;
        let to = change.target;
        if !check_transition(from, to)? {
            return Ok(None);
        }

        let effects = transition_effects(
            from,
            to,
            OrderFlags {
                stock_reduced: order.stock_reduced,
                revenue_credited: order.revenue_credited,
                payment_method: order.payment_method,
                payment_status: order.payment_status,
            },
        );
        let now = self.clock.now();

        let payment_status = if effects.mark_refunded {
            PaymentStatus::Refunded
        } else if effects.mark_paid || change.mark_paid {
            PaymentStatus::Paid
        } else {
            order.payment_status
        };
        let stock_reduced = (order.stock_reduced || effects.reduce_stock) && !effects.restore_stock;
        let revenue_credited =
            (order.revenue_credited || effects.credit_revenue) && !effects.reverse_revenue;

        // The version guard makes this the only writer of this transition.
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::CurrentStatus, Expr::value(to.to_value()))
            .col_expr(order::Column::PaymentStatus, Expr::value(payment_status.to_value()))
            .col_expr(order::Column::StockReduced, Expr::value(stock_reduced))
            .col_expr(order::Column::RevenueCredited, Expr::value(revenue_credited))
            .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Version.eq(order.version));
        if change.archive {
            update = update.col_expr(order::Column::IsArchived, Expr::value(true));
        }
        if let Some(reference) = &change.payment_reference {
            update = update.col_expr(
                order::Column::PaymentReference,
                Expr::value(Some(reference.clone())),
            );
        }
        if update.exec(conn).await?.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        seller_order::Entity::update_many()
            .col_expr(seller_order::Column::Status, Expr::value(to.to_value()))
            .col_expr(seller_order::Column::UpdatedAt, Expr::value(now))
            .filter(seller_order::Column::OrderId.eq(order.id))
            .exec(conn)
            .await?;

        if effects.reduce_stock || effects.restore_stock {
            let lines = order_stock_lines(conn, order.id).await?;
            if effects.reduce_stock {
                reduce_order_stock(conn, &lines).await?;
            } else {
                restore_order_stock(conn, &lines).await?;
            }
        }
        if effects.credit_revenue {
            credit_seller_revenue(conn, order.id, now).await?;
        }
        if effects.reverse_revenue {
            reverse_seller_revenue(conn, order.id, now).await?;
        }
        if effects.refund_wallet {
            let amount = round_money(order.total);
            if amount > Decimal::ZERO {
                wallet::credit(
                    conn,
                    order.buyer_id,
                    amount,
                    &order.currency,
                    &format!("refund:{}", order.order_number),
                    &format!("Refund for order {}", order.order_number),
                )
                .await?;
            }
        }

        append_tracking(conn, order.id, to, change.note, change.actor, now).await?;
        info!(order_id = %order.id, %from, %to, "order status changed");
        Ok(Some((from, to)))
    }

    async fn after_transition(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) {
        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status: from.to_string(),
            new_status: to.to_string(),
        });
        if to == OrderStatus::Cancelled {
            self.emit(Event::OrderCancelled(order_id));
        }
        match load_order(&*self.db, order_id).await {
            Ok(order) => self.emit(Event::NotificationRequested {
                recipient: Recipient::Buyer(order.buyer_id),
                order_id,
                title: format!("Order {} is now {}", order.order_number, to),
            }),
            Err(e) => warn!(error = %e, %order_id, "could not notify buyer"),
        }
    }
}

fn distinct<I: IntoIterator<Item = Uuid>>(ids: I) -> Vec<Uuid> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

async fn order_stock_lines<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<StockLine>, ServiceError> {
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|item| StockLine {
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            label: item.sku.unwrap_or(item.product_name),
        })
        .collect())
}

async fn append_tracking<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: OrderStatus,
    note: Option<String>,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let existing = order_tracking_event::Entity::find()
        .filter(order_tracking_event::Column::OrderId.eq(order_id))
        .count(conn)
        .await?;
    order_tracking_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        sequence: Set(existing as i32 + 1),
        status: Set(status),
        note: Set(note),
        actor_id: Set(Some(actor.user_id)),
        actor_role: Set(actor.role.as_str().to_string()),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Pays every pending slice out to its seller's balance.
async fn credit_seller_revenue<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let slices = seller_order::Entity::find()
        .filter(seller_order::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    for slice in slices.into_iter().filter(|s| s.payout_status == PayoutStatus::Pending) {
        let claimed = seller_order::Entity::update_many()
            .col_expr(
                seller_order::Column::PayoutStatus,
                Expr::value(PayoutStatus::Credited.to_value()),
            )
            .filter(seller_order::Column::Id.eq(slice.id))
            .filter(seller_order::Column::PayoutStatus.eq(PayoutStatus::Pending.to_value()))
            .exec(conn)
            .await?;
        if claimed.rows_affected == 0 {
            continue;
        }
        let payout = round_money(slice.payout_amount);
        seller::Entity::update_many()
            .col_expr(seller::Column::Balance, Expr::col(seller::Column::Balance).add(payout))
            .col_expr(seller::Column::UpdatedAt, Expr::value(now))
            .filter(seller::Column::Id.eq(slice.seller_id))
            .exec(conn)
            .await?;
        info!(seller_id = %slice.seller_id, %payout, "seller revenue credited");
    }
    Ok(())
}

/// Takes credited payouts back out of seller balances.
async fn reverse_seller_revenue<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let slices = seller_order::Entity::find()
        .filter(seller_order::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    for slice in slices.into_iter().filter(|s| s.payout_status == PayoutStatus::Credited) {
        let claimed = seller_order::Entity::update_many()
            .col_expr(
                seller_order::Column::PayoutStatus,
                Expr::value(PayoutStatus::Reversed.to_value()),
            )
            .filter(seller_order::Column::Id.eq(slice.id))
            .filter(seller_order::Column::PayoutStatus.eq(PayoutStatus::Credited.to_value()))
            .exec(conn)
            .await?;
        if claimed.rows_affected == 0 {
            continue;
        }
        let payout = round_money(slice.payout_amount);
        seller::Entity::update_many()
            .col_expr(seller::Column::Balance, Expr::col(seller::Column::Balance).sub(payout))
            .col_expr(seller::Column::UpdatedAt, Expr::value(now))
            .filter(seller::Column::Id.eq(slice.seller_id))
            .exec(conn)
            .await?;
        warn!(seller_id = %slice.seller_id, %payout, "seller revenue reversed");
    }
    Ok(())
}
