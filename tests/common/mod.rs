#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, Response},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use marketplace_api::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        address,
        coupon::{self, Entity as CouponEntity},
        coupon_batch::{self, CouponFunding, DiscountType},
        coupon_usage,
        neighborhood, pickup_center,
        product::{self, ModerationStatus, ProductStatus},
        product_variant,
        seller::{self, SellerStatus},
        shipping_zone, wallet,
    },
    events::{self, Event},
    handlers::AppServices,
    money::round_money,
    services::{
        orders::{CreateOrderRequest, OrderItemRequest, OrderService},
        FixedClock,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration_tests_secret_value_0123456789abcdef";

/// 09:00 UTC, before the 14:00 same-day cutoff.
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Application state backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub orders: Arc<OrderService>,
    pub db: Arc<DatabaseConnection>,
    pub events: mpsc::Receiver<Event>,
    pub now: DateTime<Utc>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::at(morning()).await
    }

    /// A fresh application whose clock is stuck at `now`.
    pub async fn at(now: DateTime<Utc>) -> Self {
        Self::build(now, |_| {}).await
    }

    pub async fn build(now: DateTime<Utc>, tweak: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build_pooled(now, 1, tweak).await
    }

    /// Like `build`, with `connections` pooled connections so transactions
    /// can actually overlap.
    pub async fn build_pooled(
        now: DateTime<Utc>,
        connections: u32,
        tweak: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("marketplace.db").display()
        );

        let mut cfg = AppConfig::new(url.clone(), JWT_SECRET.to_string(), "test".to_string());
        cfg.db_max_connections = connections;
        tweak(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig {
            url,
            max_connections: connections,
            min_connections: 1,
            acquire_timeout: std::time::Duration::from_secs(30),
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (sender, events) = events::channel(256);
        let settings = cfg
            .marketplace
            .order_settings()
            .expect("valid marketplace settings");
        let orders = OrderService::new(db.clone(), settings, Some(Arc::new(sender)))
            .with_clock(Arc::new(FixedClock(now)));
        let services = AppServices::from_order_service(orders);
        let orders = services.orders.clone();
        let state = AppState::with_services(db.clone(), cfg, services);
        let router = app_router(state.clone());

        let app = Self {
            router,
            state,
            orders,
            db,
            events,
            now,
            _dir: dir,
        };
        app.seed_accra_zone().await;
        app
    }

    pub fn token(&self, user_id: Uuid, roles: &[&str]) -> String {
        self.state
            .auth
            .issue_token(user_id, roles)
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        serde_json::from_slice(&bytes).expect("parse response body")
    }

    /// Zone `A` (50 base, 5 per kg) covering Accra through Osu.
    async fn seed_accra_zone(&self) {
        shipping_zone::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set("A".into()),
            name: Set("Central Accra".into()),
            base_rate: Set(dec!(50)),
            per_kg_rate: Set(dec!(5)),
            express_multiplier: Set(dec!(1.5)),
            same_day_multiplier: Set(dec!(2)),
            fragile_surcharge: Set(dec!(7.5)),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("seed zone");
        neighborhood::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Osu".into()),
            city: Set("ACCRA".into()),
            zone_code: Set("A".into()),
            is_representative: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("seed neighborhood");
    }

    pub async fn seed_pickup_center(&self) -> pickup_center::Model {
        pickup_center::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Accra Mall Desk".into()),
            city: Set("ACCRA".into()),
            zone_code: Set("A".into()),
            is_active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("seed pickup center")
    }

    pub async fn seed_seller(&self, vat_registered: bool) -> seller::Model {
        seller::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Seller".into()),
            email: Set(None),
            status: Set(SellerStatus::Active),
            vat_registered: Set(vat_registered),
            commission_rate: Set(None),
            balance: Set(Decimal::ZERO),
            created_at: Set(self.now),
            updated_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed seller")
    }

    /// An approved product without variants.
    pub async fn seed_product(
        &self,
        seller_id: Uuid,
        base_price: Decimal,
        stock: i32,
        weight_kg: Option<Decimal>,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(Some(seller_id)),
            is_platform_product: Set(false),
            name: Set(format!("Product {}", &Uuid::new_v4().to_string()[..8])),
            category_id: Set(None),
            base_price: Set(base_price),
            total_stock: Set(stock),
            total_sold: Set(0),
            weight_kg: Set(weight_kg),
            is_fragile: Set(false),
            status: Set(ProductStatus::Active),
            moderation_status: Set(ModerationStatus::Approved),
            is_deleted: Set(false),
            created_at: Set(self.now),
            updated_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        price: Decimal,
        stock: i32,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(sku.into()),
            price: Set(price),
            stock: Set(stock),
            attributes: Set(Some(json!({ "size": "M" }))),
            created_at: Set(self.now),
            updated_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed variant")
    }

    pub async fn seed_address(&self, user_id: Uuid, city: &str) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            recipient_name: Set("Ama Mensah".into()),
            phone: Set("+233200000000".into()),
            street: Set("12 Oxford Street".into()),
            area: Set(Some("Osu".into())),
            city: Set(city.into()),
            region: Set(Some("Greater Accra".into())),
            created_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_wallet(&self, user_id: Uuid, balance: Decimal, hold: Decimal) -> wallet::Model {
        wallet::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            balance: Set(balance),
            hold_amount: Set(hold),
            currency: Set("GHS".into()),
            created_at: Set(self.now),
            updated_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed wallet")
    }

    /// A percentage or fixed coupon batch with one code.
    pub async fn seed_coupon(&self, spec: CouponSpec) -> coupon::Model {
        let batch_id = Uuid::new_v4();
        coupon_batch::ActiveModel {
            id: Set(batch_id),
            name: Set(format!("Batch {}", spec.code)),
            discount_type: Set(spec.discount_type),
            discount_value: Set(spec.value),
            max_discount_amount: Set(spec.max_discount),
            min_order_amount: Set(spec.min_order),
            valid_from: Set(self.now - Duration::days(31)),
            expires_at: Set(spec.expires_at.unwrap_or(self.now + Duration::days(30))),
            max_usage: Set(spec.max_usage),
            usage_count: Set(0),
            max_usage_per_user: Set(spec.max_usage_per_user),
            single_use_codes: Set(spec.single_use),
            applicable_products: Set(json!(spec.products)),
            applicable_categories: Set(json!([])),
            applicable_sellers: Set(json!([])),
            seller_id: Set(spec.seller_id),
            funded_by: Set(spec.funded_by),
            is_active: Set(true),
            created_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon batch");

        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            batch_id: Set(batch_id),
            code: Set(spec.code.to_uppercase()),
            recipient_id: Set(None),
            used: Set(false),
            used_at: Set(None),
            used_by: Set(None),
            order_id: Set(None),
            usage_count: Set(0),
            created_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon")
    }

    /// Records an earlier redemption of `unit` by `user_id`.
    pub async fn seed_coupon_usage(&self, unit: &coupon::Model, user_id: Uuid, slot: Option<i32>) {
        coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            batch_id: Set(unit.batch_id),
            coupon_id: Set(unit.id),
            user_id: Set(user_id),
            order_id: Set(Uuid::new_v4()),
            user_slot: Set(slot),
            discount: Set(Decimal::ZERO),
            created_at: Set(self.now),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon usage");
    }

    pub async fn set_moderation(&self, product_id: Uuid, status: ModerationStatus) {
        let mut product: product::ActiveModel = self.product(product_id).await.into();
        product.moderation_status = Set(status);
        product.update(&*self.db).await.expect("update product");
    }

    pub async fn coupon(&self, id: Uuid) -> coupon::Model {
        CouponEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query coupon")
            .expect("coupon exists")
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query product")
            .expect("product exists")
    }

    pub async fn variant(&self, id: Uuid) -> product_variant::Model {
        product_variant::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query variant")
            .expect("variant exists")
    }

    pub async fn seller_balance(&self, id: Uuid) -> Decimal {
        let seller = seller::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query seller")
            .expect("seller exists");
        round_money(seller.balance)
    }

    pub async fn wallet_balance(&self, user_id: Uuid) -> Decimal {
        use sea_orm::{ColumnTrait, QueryFilter};
        let wallet = wallet::Entity::find()
            .filter(wallet::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .expect("query wallet")
            .expect("wallet exists");
        round_money(wallet.balance)
    }
}

#[derive(Debug, Clone)]
pub struct CouponSpec {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub max_discount: Option<Decimal>,
    pub min_order: Option<Decimal>,
    pub max_usage: Option<i32>,
    pub max_usage_per_user: Option<i32>,
    pub single_use: bool,
    pub seller_id: Option<Uuid>,
    pub funded_by: CouponFunding,
    pub products: Vec<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponSpec {
    pub fn percentage(code: &str, percent: Decimal) -> Self {
        Self {
            code: code.into(),
            discount_type: DiscountType::Percentage,
            value: percent,
            max_discount: None,
            min_order: None,
            max_usage: None,
            max_usage_per_user: None,
            single_use: false,
            seller_id: None,
            funded_by: CouponFunding::Platform,
            products: Vec::new(),
            expires_at: None,
        }
    }

    pub fn fixed(code: &str, amount: Decimal) -> Self {
        Self {
            discount_type: DiscountType::Fixed,
            value: amount,
            ..Self::percentage(code, Decimal::ZERO)
        }
    }
}

pub fn item(product_id: Uuid, quantity: i64) -> OrderItemRequest {
    OrderItemRequest {
        product: product_id,
        sku: None,
        quantity,
        price: None,
    }
}

pub fn order_request(
    address_id: Uuid,
    items: Vec<OrderItemRequest>,
    payment_method: &str,
) -> CreateOrderRequest {
    serde_json::from_value(json!({
        "orderItems": items,
        "address": address_id,
        "paymentMethod": payment_method,
    }))
    .expect("valid order request")
}
