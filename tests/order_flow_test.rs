mod common;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use marketplace_api::{
    config::AppConfig,
    entities::{
        coupon_usage,
        order::{self, OrderStatus, PaymentStatus},
        order_deletion_audit, order_item,
        product::ModerationStatus,
        seller_order::{self, PayoutStatus},
    },
    errors::{CouponError, ServiceError},
    events::Event,
    services::{
        orders::{Actor, ConfirmPaymentRequest, DeleteOutcome, UpdateOrderStatusRequest},
        tax::VatCollector,
    },
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use uuid::Uuid;

use common::{item, morning, order_request, CouponSpec, TestApp};

fn untaxed(cfg: &mut AppConfig) {
    cfg.marketplace.vat_rate = Decimal::ZERO;
    cfg.marketplace.nhil_rate = Decimal::ZERO;
    cfg.marketplace.getfund_rate = Decimal::ZERO;
}

async fn untaxed_app() -> TestApp {
    TestApp::build(morning(), untaxed).await
}

fn status(value: &str) -> UpdateOrderStatusRequest {
    UpdateOrderStatusRequest {
        status: value.to_string(),
        note: None,
        expected_version: None,
    }
}

async fn order_count(app: &TestApp) -> u64 {
    order::Entity::find().count(&*app.db).await.unwrap()
}

#[tokio::test]
async fn creates_a_priced_order_from_catalog_prices() {
    let mut app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(100), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut line = item(product.id, 2);
    line.price = Some(dec!(1)); // tampered client price is ignored
    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![line], "pay_on_delivery"))
        .await
        .unwrap();

    assert_eq!(order.current_status, OrderStatus::PendingPayment);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.order_number.starts_with("ORD-20260302-"));
    assert!(order.tracking_number.starts_with("TRK-"));

    let line = &order.items[0];
    assert_eq!(line.unit_price, dec!(120.75));
    assert_eq!(line.line_total, dec!(241.50));
    assert_eq!(order.subtotal, dec!(241.50));
    assert_eq!(order.tax_total, dec!(41.50));
    // 4 kg in zone A: 50 + 5 * 4
    assert_eq!(order.shipping_fee, dec!(70));
    assert_eq!(order.total, dec!(311.50));
    assert_eq!(order.display_total, dec!(312));

    let slice = &order.seller_orders[0];
    assert_eq!(slice.seller_id, seller.id);
    assert_eq!(slice.item_ids, vec![line.id]);
    assert_eq!(slice.shipping_fee, Decimal::ZERO);
    assert_eq!(slice.vat_collector, VatCollector::Seller);
    assert_eq!(slice.commission, dec!(24.15));
    assert_eq!(slice.commission_vat, dec!(3.62));
    assert_eq!(slice.payout_amount, dec!(213.73));
    assert_eq!(slice.payout_status, PayoutStatus::Pending);

    assert_eq!(order.tracking.len(), 1);
    assert_eq!(order.tracking[0].status, OrderStatus::PendingPayment);

    // Deferred payment leaves stock alone.
    assert!(!order.stock_reduced);
    assert_eq!(app.product(product.id).await.total_stock, 5);

    assert_matches!(app.events.try_recv(), Ok(Event::OrderCreated { order_id, .. }) if order_id == order.id);
}

#[tokio::test]
async fn two_kilos_standard_dispatch_costs_sixty() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(30), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "ACCRA").await;

    let quote = app
        .orders
        .validate_cart(buyer, &order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery"))
        .await
        .unwrap();

    assert_eq!(quote.shipping_fee, dec!(60));
    assert_eq!(quote.shipping.zone_code, "A");
    assert_eq!(quote.total, dec!(90));
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn wallet_hold_is_not_spendable() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(30), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_wallet(buyer, dec!(100), dec!(20)).await;

    let err = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "stored_balance"))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientWalletBalance { required, available }
            if required == dec!(90) && available == dec!(80)
    );
    assert_eq!(order_count(&app).await, 0);
    assert_eq!(app.wallet_balance(buyer).await, dec!(100));
    assert_eq!(app.product(product.id).await.total_stock, 5);
}

#[tokio::test]
async fn stored_balance_settles_inside_the_order() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(30), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_wallet(buyer, dec!(110), dec!(20)).await;

    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "wallet"))
        .await
        .unwrap();

    assert_eq!(order.current_status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(
        order.payment_reference.as_deref(),
        Some(format!("order:{}", order.order_number).as_str())
    );
    assert!(order.stock_reduced);
    assert_eq!(app.wallet_balance(buyer).await, dec!(20));
    assert_eq!(app.product(product.id).await.total_stock, 4);
}

#[tokio::test]
async fn last_unit_goes_to_exactly_one_buyer() {
    let app = TestApp::build_pooled(morning(), 4, untaxed).await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(10), 1, None).await;
    let variant = app.seed_variant(product.id, "BLU-M", dec!(10), 1).await;

    let mut requests = Vec::new();
    for _ in 0..4 {
        let buyer = Uuid::new_v4();
        let address = app.seed_address(buyer, "Accra").await;
        app.seed_wallet(buyer, dec!(200), Decimal::ZERO).await;
        let mut line = item(product.id, 1);
        line.sku = Some("BLU-M".into());
        requests.push((buyer, order_request(address.id, vec![line], "stored_balance")));
    }

    let (a, b, c, d) = tokio::join!(
        app.orders.create_order(requests[0].0, requests[0].1.clone()),
        app.orders.create_order(requests[1].0, requests[1].1.clone()),
        app.orders.create_order(requests[2].0, requests[2].1.clone()),
        app.orders.create_order(requests[3].0, requests[3].1.clone()),
    );

    let outcomes = [a, b, c, d];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    // Losers either saw the unit gone or were refused the write lock.
    for err in outcomes.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(
            err,
            ServiceError::InsufficientStock(_) | ServiceError::DatabaseError(_)
        );
    }

    assert_eq!(app.variant(variant.id).await.stock, 0);
    let product = app.product(product.id).await;
    assert_eq!(product.total_stock, 0);
    assert_eq!(
        product.status,
        marketplace_api::entities::product::ProductStatus::OutOfStock
    );
    assert_eq!(order_count(&app).await, 1);

    // Every loser's debit rolled back with its order.
    let mut untouched = 0;
    for (buyer, _) in &requests {
        if app.wallet_balance(*buyer).await == dec!(200) {
            untouched += 1;
        }
    }
    assert_eq!(untouched, 3);
}

#[tokio::test]
async fn single_use_code_redeems_once() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(100), 10, None).await;
    let mut spec = CouponSpec::fixed("welcome10", dec!(10));
    spec.single_use = true;
    let coupon = app.seed_coupon(spec).await;

    let mut results = Vec::new();
    for _ in 0..2 {
        let buyer = Uuid::new_v4();
        let address = app.seed_address(buyer, "Accra").await;
        let mut request = order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery");
        request.coupon_code = Some(" Welcome10 ".into());
        results.push(app.orders.create_order(buyer, request).await);
    }

    let first = results.remove(0).unwrap();
    assert_eq!(first.discount, dec!(10));
    assert_eq!(first.coupon_code.as_deref(), Some("WELCOME10"));
    assert_matches!(
        results.remove(0),
        Err(ServiceError::Coupon(CouponError::AlreadyUsed))
    );

    let coupon = app.coupon(coupon.id).await;
    assert!(coupon.used);
    assert_eq!(coupon.order_id, Some(first.id));
    assert_eq!(coupon_usage::Entity::find().count(&*app.db).await.unwrap(), 1);
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test]
async fn percentage_discount_is_capped() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(500), 10, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    let mut spec = CouponSpec::percentage("TENOFF", dec!(10));
    spec.max_discount = Some(dec!(20));
    app.seed_coupon(spec).await;

    let mut request = order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery");
    request.coupon_code = Some("TENOFF".into());
    let quote = app.orders.validate_cart(buyer, &request).await.unwrap();

    assert_eq!(quote.subtotal, dec!(500));
    assert_eq!(quote.discount, dec!(20));
    // 0.5 kg default weight: ceil(50 + 2.5)
    assert_eq!(quote.shipping_fee, dec!(53));
    assert_eq!(quote.total, dec!(533));
    assert_eq!(quote.seller_orders[0].platform_funded_discount, dec!(20));
}

#[tokio::test]
async fn coupon_minimum_and_cap_are_enforced() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 10, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut minimum = CouponSpec::fixed("BIGSPEND", dec!(5));
    minimum.min_order = Some(dec!(100));
    app.seed_coupon(minimum).await;
    let mut request = order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery");
    request.coupon_code = Some("BIGSPEND".into());
    assert_matches!(
        app.orders.validate_cart(buyer, &request).await,
        Err(ServiceError::Coupon(CouponError::MinimumNotMet(min))) if min == dec!(100)
    );

    let mut capped = CouponSpec::fixed("ONCEONLY", dec!(5));
    capped.max_usage = Some(1);
    app.seed_coupon(capped).await;
    request.coupon_code = Some("ONCEONLY".into());
    app.orders.create_order(buyer, request.clone()).await.unwrap();
    assert_matches!(
        app.orders.create_order(buyer, request).await,
        Err(ServiceError::Coupon(CouponError::UsageCapReached))
    );

    let mut unknown = order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery");
    unknown.coupon_code = Some("NOPE".into());
    assert_matches!(
        app.orders.validate_cart(buyer, &unknown).await,
        Err(ServiceError::Coupon(CouponError::NotFound))
    );
}

#[tokio::test]
async fn seller_delivery_splits_fees_per_seller() {
    let app = untaxed_app().await;
    let first = app.seed_seller(false).await;
    let second = app.seed_seller(false).await;
    let heavy = app.seed_product(first.id, dec!(100), 5, Some(dec!(2))).await;
    let light = app.seed_product(second.id, dec!(50), 5, Some(dec!(1))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_coupon(CouponSpec::fixed("SPLIT30", dec!(30))).await;

    let mut request = order_request(
        address.id,
        vec![item(heavy.id, 1), item(light.id, 2)],
        "pay_on_delivery",
    );
    request.delivery_method = marketplace_api::entities::order::DeliveryMethod::SellerDelivery;
    request.coupon_code = Some("split30".into());
    let order = app.orders.create_order(buyer, request).await.unwrap();

    assert_eq!(order.seller_orders.len(), 2);
    assert_eq!(order.seller_orders[0].seller_id, first.id);
    assert_eq!(order.seller_orders[0].shipping_fee, dec!(60));
    assert_eq!(order.seller_orders[1].shipping_fee, dec!(60));
    assert_eq!(order.subtotal, dec!(200));
    assert_eq!(order.shipping_fee, dec!(120));
    assert_eq!(order.discount, dec!(30));
    assert_eq!(order.total, dec!(290));

    let slice_total: Decimal = order.seller_orders.iter().map(|s| s.total).sum();
    let slice_discount: Decimal = order.seller_orders.iter().map(|s| s.discount).sum();
    assert_eq!(slice_total, order.total);
    assert_eq!(slice_discount, order.discount);

    let mut item_ids: Vec<Uuid> = order
        .seller_orders
        .iter()
        .flat_map(|s| s.item_ids.clone())
        .collect();
    item_ids.sort();
    let mut expected: Vec<Uuid> = order.items.iter().map(|i| i.id).collect();
    expected.sort();
    assert_eq!(item_ids, expected);
}

#[tokio::test]
async fn rejects_foreign_addresses_and_unserved_cities() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 5, None).await;
    let buyer = Uuid::new_v4();

    let someone_else = app.seed_address(Uuid::new_v4(), "Accra").await;
    assert_matches!(
        app.orders
            .create_order(buyer, order_request(someone_else.id, vec![item(product.id, 1)], "cod"))
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let remote = app.seed_address(buyer, "Tamale").await;
    assert_matches!(
        app.orders
            .create_order(buyer, order_request(remote.id, vec![item(product.id, 1)], "cod"))
            .await,
        Err(ServiceError::ValidationError(_))
    );

    assert_matches!(
        app.orders
            .create_order(buyer, order_request(Uuid::new_v4(), vec![item(product.id, 1)], "cod"))
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn same_day_is_refused_after_cutoff() {
    let afternoon = Utc.with_ymd_and_hms(2026, 3, 2, 15, 30, 0).unwrap();
    let app = TestApp::at(afternoon).await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let request = serde_json::from_value(json!({
        "orderItems": [{ "product": product.id, "quantity": 1 }],
        "address": address.id,
        "paymentMethod": "pay_on_delivery",
        "deliverySpeed": "same_day"
    }))
    .unwrap();
    assert_matches!(
        app.orders.create_order(buyer, request).await,
        Err(ServiceError::CutoffPassed)
    );
}

#[tokio::test]
async fn buyer_can_cancel_before_dispatch_only() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(100), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let admin = Actor::admin(Uuid::new_v4());
    let address = app.seed_address(buyer, "Accra").await;

    let pending = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery"))
        .await
        .unwrap();
    let outcome = app
        .orders
        .cancel_or_delete(pending.id, Actor::buyer(buyer))
        .await
        .unwrap();
    let cancelled = match outcome {
        DeleteOutcome::Cancelled { order } => order,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(cancelled.current_status, OrderStatus::Cancelled);
    assert!(cancelled.is_archived);
    assert_eq!(cancelled.tracking.len(), 2);

    let delivered = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery"))
        .await
        .unwrap();
    app.orders
        .update_status(delivered.id, admin, status("delivered"))
        .await
        .unwrap();
    assert_matches!(
        app.orders.cancel_or_delete(delivered.id, Actor::buyer(buyer)).await,
        Err(ServiceError::InvalidTransition(_))
    );
    assert_matches!(
        app.orders.cancel_or_delete(delivered.id, Actor::buyer(Uuid::new_v4())).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn delivery_credits_sellers_and_refund_reverses() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(100), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let admin = Actor::admin(Uuid::new_v4());
    let address = app.seed_address(buyer, "Accra").await;

    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 2)], "pay_on_delivery"))
        .await
        .unwrap();

    let shipped = app
        .orders
        .update_status(order.id, Actor::seller(seller.id), status("shipped"))
        .await
        .unwrap();
    assert_eq!(shipped.current_status, OrderStatus::OutForDelivery);
    assert!(shipped.stock_reduced);
    assert_eq!(app.product(product.id).await.total_stock, 3);

    let delivered = app
        .orders
        .update_status(order.id, admin, status("delivered"))
        .await
        .unwrap();
    assert!(delivered.revenue_credited);
    assert_eq!(delivered.payment_status, PaymentStatus::Paid);
    assert_eq!(delivered.seller_orders[0].payout_status, PayoutStatus::Credited);
    assert_eq!(app.seller_balance(seller.id).await, dec!(213.73));

    // Repeating the status is a no-op.
    let again = app
        .orders
        .update_status(order.id, admin, status("completed"))
        .await
        .unwrap();
    assert_eq!(again.version, delivered.version);
    assert_eq!(app.seller_balance(seller.id).await, dec!(213.73));

    assert_matches!(
        app.orders
            .update_status(order.id, Actor::seller(seller.id), status("refunded"))
            .await,
        Err(ServiceError::Forbidden(_))
    );
    let refunded = app
        .orders
        .update_status(order.id, admin, status("refunded"))
        .await
        .unwrap();
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.seller_orders[0].payout_status, PayoutStatus::Reversed);
    assert_eq!(app.seller_balance(seller.id).await, Decimal::ZERO);
    assert_eq!(app.product(product.id).await.total_stock, 3);
}

#[tokio::test]
async fn cancelling_a_wallet_order_refunds_and_restocks() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(30), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_wallet(buyer, dec!(100), Decimal::ZERO).await;

    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "stored_balance"))
        .await
        .unwrap();
    assert_eq!(app.wallet_balance(buyer).await, dec!(10));

    let cancelled = app
        .orders
        .update_status(order.id, Actor::buyer(buyer), status("canceled"))
        .await
        .unwrap();
    assert_eq!(cancelled.current_status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    assert!(!cancelled.stock_reduced);
    assert_eq!(app.wallet_balance(buyer).await, dec!(100));
    assert_eq!(app.product(product.id).await.total_stock, 5);
}

#[tokio::test]
async fn buyers_and_strangers_have_limited_powers() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "cod"))
        .await
        .unwrap();

    assert_matches!(
        app.orders
            .update_status(order.id, Actor::buyer(buyer), status("delivered"))
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.orders
            .update_status(order.id, Actor::seller(Uuid::new_v4()), status("processing"))
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.orders.get_order(order.id, Actor::buyer(Uuid::new_v4())).await,
        Err(ServiceError::Forbidden(_))
    );
    assert!(app.orders.get_order(order.id, Actor::seller(seller.id)).await.is_ok());
    assert_matches!(
        app.orders
            .update_status(order.id, Actor::admin(Uuid::new_v4()), status("on_hold"))
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn stale_versions_are_rejected() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "cod"))
        .await
        .unwrap();

    let mut request = status("processing");
    request.expected_version = Some(order.version + 1);
    assert_matches!(
        app.orders
            .update_status(order.id, Actor::admin(Uuid::new_v4()), request)
            .await,
        Err(ServiceError::ConcurrentModification(id)) if id == order.id
    );

    let mut request = status("processing");
    request.expected_version = Some(order.version);
    let updated = app
        .orders
        .update_status(order.id, Actor::admin(Uuid::new_v4()), request)
        .await
        .unwrap();
    assert_eq!(updated.version, order.version + 1);
}

#[tokio::test]
async fn confirming_payment_takes_stock_once() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(10), 5, None).await;
    let buyer = Uuid::new_v4();
    let admin = Actor::admin(Uuid::new_v4());
    let address = app.seed_address(buyer, "Accra").await;
    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 2)], "external_gateway"))
        .await
        .unwrap();
    let confirm = || ConfirmPaymentRequest {
        reference: "PSK-0001".into(),
    };

    assert_matches!(
        app.orders.confirm_payment(order.id, Actor::buyer(buyer), confirm()).await,
        Err(ServiceError::Forbidden(_))
    );

    let confirmed = app.orders.confirm_payment(order.id, admin, confirm()).await.unwrap();
    assert_eq!(confirmed.current_status, OrderStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Paid);
    assert_eq!(confirmed.payment_reference.as_deref(), Some("PSK-0001"));
    assert_eq!(app.product(product.id).await.total_stock, 3);

    let replay = app.orders.confirm_payment(order.id, admin, confirm()).await.unwrap();
    assert_eq!(replay.version, confirmed.version);
    assert_eq!(app.product(product.id).await.total_stock, 3);

    assert_matches!(
        app.orders
            .confirm_payment(
                order.id,
                admin,
                ConfirmPaymentRequest {
                    reference: "PSK-0002".into()
                }
            )
            .await,
        Err(ServiceError::InvalidTransition(_))
    );
}

#[tokio::test]
async fn admin_delete_keeps_an_audit_snapshot() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(30), 5, Some(dec!(2))).await;
    let buyer = Uuid::new_v4();
    let admin_id = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_wallet(buyer, dec!(100), Decimal::ZERO).await;
    let order = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "stored_balance"))
        .await
        .unwrap();
    assert_eq!(app.product(product.id).await.total_stock, 4);

    assert_matches!(
        app.orders.cancel_or_delete(order.id, Actor::seller(seller.id)).await,
        Err(ServiceError::Forbidden(_))
    );

    let outcome = app
        .orders
        .cancel_or_delete(order.id, Actor::admin(admin_id))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DeleteOutcome::Deleted {
            order_id: order.id,
            order_number: order.order_number.clone()
        }
    );

    assert_eq!(order_count(&app).await, 0);
    assert_eq!(app.product(product.id).await.total_stock, 5);
    let audits = order_deletion_audit::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].deleted_by, admin_id);
    assert_eq!(audits[0].snapshot["order_number"], json!(order.order_number));
    assert_matches!(
        app.orders.get_order(order.id, Actor::admin(admin_id)).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn a_created_order_reads_back_unchanged() {
    let app = TestApp::new().await;
    let first = app.seed_seller(true).await;
    let second = app.seed_seller(false).await;
    let shirt = app.seed_product(first.id, dec!(100), 5, Some(dec!(1))).await;
    app.seed_variant(shirt.id, "SHIRT-M", dec!(80), 5).await;
    let mug = app.seed_product(second.id, dec!(40), 5, None).await;
    app.seed_coupon(CouponSpec::fixed("ROUNDTRIP", dec!(12))).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut shirt_line = item(shirt.id, 2);
    shirt_line.sku = Some("SHIRT-M".into());
    let mut request = order_request(
        address.id,
        vec![shirt_line, item(mug.id, 3)],
        "pay_on_delivery",
    );
    request.coupon_code = Some("roundtrip".into());

    let quote = app.orders.validate_cart(buyer, &request).await.unwrap();
    let created = app.orders.create_order(buyer, request).await.unwrap();
    let fetched = app
        .orders
        .get_order(created.id, Actor::buyer(buyer))
        .await
        .unwrap();
    assert_eq!(fetched, created);

    assert_eq!(fetched.buyer_id, buyer);
    assert_eq!(fetched.address_id, address.id);
    assert_eq!(fetched.subtotal, quote.subtotal);
    assert_eq!(fetched.discount, dec!(12));
    assert_eq!(fetched.discount, quote.discount);
    assert_eq!(fetched.shipping_fee, quote.shipping_fee);
    assert_eq!(fetched.tax_total, quote.tax_total);
    assert_eq!(fetched.total, quote.total);
    assert_eq!(fetched.display_total, quote.display_total);
    assert_eq!(fetched.coupon_code.as_deref(), Some("ROUNDTRIP"));
    assert_eq!(fetched.created_at, app.now);

    assert_eq!(fetched.items.len(), 2);
    for (item, line) in fetched.items.iter().zip(&quote.lines) {
        assert_eq!(item.product_id, line.product_id);
        assert_eq!(item.variant_id, line.variant_id);
        assert_eq!(item.sku, line.sku);
        assert_eq!(item.product_name, line.product_name);
        assert_eq!(item.seller_id, line.seller_id);
        assert_eq!(item.quantity, line.quantity);
        assert_eq!(item.base_price, line.base_price);
        assert_eq!(item.vat_amount, line.vat_amount);
        assert_eq!(item.unit_price, line.unit_price);
        assert_eq!(item.line_total, line.line_total);
    }
    assert_eq!(fetched.items[0].sku.as_deref(), Some("SHIRT-M"));
    assert_eq!(fetched.items[0].base_price, dec!(80));
    assert_eq!(fetched.items[1].quantity, 3);

    assert_eq!(fetched.seller_orders.len(), quote.seller_orders.len());
    for (slice, draft) in fetched.seller_orders.iter().zip(&quote.seller_orders) {
        assert_eq!(slice.order_id, fetched.id);
        assert_eq!(slice.seller_id, draft.seller_id);
        assert_eq!(slice.subtotal, draft.subtotal);
        assert_eq!(slice.discount, draft.discount);
        assert_eq!(slice.tax_total, draft.tax_total);
        assert_eq!(slice.total, draft.total);
        assert_eq!(slice.commission, draft.commission);
        assert_eq!(slice.commission_vat, draft.commission_vat);
        assert_eq!(slice.payout_amount, draft.payout_amount);
        let expected: Vec<Uuid> = draft
            .line_indexes
            .iter()
            .map(|&idx| fetched.items[idx].id)
            .collect();
        assert_eq!(slice.item_ids, expected);
    }

    assert_eq!(fetched.tracking.len(), 1);
    let placed = &fetched.tracking[0];
    assert_eq!(placed.sequence, 1);
    assert_eq!(placed.status, OrderStatus::PendingPayment);
    assert_eq!(placed.note.as_deref(), Some("Order placed"));
    assert_eq!(placed.actor_id, Some(buyer));
    assert_eq!(placed.actor_role, "buyer");
    assert_eq!(placed.created_at, app.now);
}

#[tokio::test]
async fn seller_scoped_coupon_is_priced_on_that_seller_only() {
    let app = untaxed_app().await;
    let big = app.seed_seller(false).await;
    let small = app.seed_seller(false).await;
    let sofa = app.seed_product(big.id, dec!(1000), 5, None).await;
    let socks = app.seed_product(small.id, dec!(15), 5, None).await;
    let mut spec = CouponSpec::percentage("SOCKS10", dec!(10));
    spec.seller_id = Some(small.id);
    app.seed_coupon(spec).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut request = order_request(
        address.id,
        vec![item(sofa.id, 1), item(socks.id, 1)],
        "pay_on_delivery",
    );
    request.coupon_code = Some("SOCKS10".into());
    let order = app.orders.create_order(buyer, request).await.unwrap();

    assert_eq!(order.subtotal, dec!(1015));
    assert_eq!(order.discount, dec!(1.50));
    assert_eq!(order.total, dec!(1013.50) + order.shipping_fee);
    let slices = &order.seller_orders;
    assert_eq!(slices[0].seller_id, big.id);
    assert_eq!(slices[0].discount, Decimal::ZERO);
    assert_eq!(slices[0].total, dec!(1000));
    assert_eq!(slices[1].seller_id, small.id);
    assert_eq!(slices[1].discount, dec!(1.50));
    assert_eq!(slices[1].total, dec!(13.50));
}

#[tokio::test]
async fn product_scoped_coupon_ignores_other_lines() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let lamp = app.seed_product(seller.id, dec!(200), 5, None).await;
    let bulb = app.seed_product(seller.id, dec!(20), 5, None).await;
    let mut spec = CouponSpec::percentage("BULBS", dec!(50));
    spec.products = vec![bulb.id];
    app.seed_coupon(spec).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut request = order_request(
        address.id,
        vec![item(lamp.id, 1), item(bulb.id, 2)],
        "pay_on_delivery",
    );
    request.coupon_code = Some("BULBS".into());
    let quote = app.orders.validate_cart(buyer, &request).await.unwrap();

    assert_eq!(quote.subtotal, dec!(240));
    assert_eq!(quote.discount, dec!(20));
    let coupon = quote.coupon.expect("coupon quote");
    assert_eq!(coupon.eligible_subtotal, dec!(40));
}

#[tokio::test]
async fn expired_and_out_of_scope_coupons_abort_the_order() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(50), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let mut stale = CouponSpec::fixed("SUMMER", dec!(5));
    stale.expires_at = Some(app.now - chrono::Duration::days(1));
    app.seed_coupon(stale).await;
    let mut elsewhere = CouponSpec::fixed("OTHERSHOP", dec!(5));
    elsewhere.products = vec![Uuid::new_v4()];
    app.seed_coupon(elsewhere).await;

    let mut request = order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery");
    request.coupon_code = Some("SUMMER".into());
    assert_matches!(
        app.orders.create_order(buyer, request.clone()).await,
        Err(ServiceError::Coupon(CouponError::Expired))
    );

    request.coupon_code = Some("OTHERSHOP".into());
    assert_matches!(
        app.orders.create_order(buyer, request).await,
        Err(ServiceError::Coupon(CouponError::ScopeMismatch))
    );
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn unapproved_products_cannot_be_ordered() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(50), 5, None).await;
    app.set_moderation(product.id, ModerationStatus::Pending).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    assert_matches!(
        app.orders
            .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery"))
            .await,
        Err(ServiceError::ProductNotOrderable(_))
    );
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn failed_coupon_redemption_rolls_back_the_whole_order() {
    let app = untaxed_app().await;
    let seller = app.seed_seller(false).await;
    let product = app.seed_product(seller.id, dec!(50), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;
    app.seed_wallet(buyer, dec!(500), Decimal::ZERO).await;

    let mut spec = CouponSpec::fixed("TWICE", dec!(5));
    spec.max_usage_per_user = Some(2);
    let unit = app.seed_coupon(spec).await;
    // Slot 1 is already taken although only one redemption is counted, so
    // the redemption passes validation and fails on the usage write.
    app.seed_coupon_usage(&unit, buyer, Some(1)).await;

    let mut request = order_request(address.id, vec![item(product.id, 1)], "stored_balance");
    request.coupon_code = Some("TWICE".into());
    assert_matches!(
        app.orders.create_order(buyer, request).await,
        Err(ServiceError::Coupon(CouponError::AlreadyUsed))
    );

    assert_eq!(order_count(&app).await, 0);
    assert_eq!(seller_order::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(order_item::Entity::find().count(&*app.db).await.unwrap(), 0);
    assert_eq!(app.wallet_balance(buyer).await, dec!(500));
    assert_eq!(app.product(product.id).await.total_stock, 5);
    let unit = app.coupon(unit.id).await;
    assert_eq!(unit.usage_count, 0);
    assert_eq!(unit.order_id, None);
    assert_eq!(coupon_usage::Entity::find().count(&*app.db).await.unwrap(), 1);
}

#[tokio::test]
async fn stored_balance_needs_a_wallet() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(50), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let err = app
        .orders
        .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "stored_balance"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentFailed(_));
    assert_eq!(err.status_code(), axum::http::StatusCode::PAYMENT_REQUIRED);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn order_transactions_are_bounded_in_time() {
    let app = TestApp::build(morning(), |cfg| cfg.marketplace.order_timeout_secs = 0).await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(50), 5, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    assert_matches!(
        app.orders
            .create_order(buyer, order_request(address.id, vec![item(product.id, 1)], "pay_on_delivery"))
            .await,
        Err(ServiceError::OrderCreationTimeout)
    );
    assert_eq!(order_count(&app).await, 0);
    assert_eq!(app.product(product.id).await.total_stock, 5);
}

#[tokio::test]
async fn oversized_carts_are_refused() {
    let app = TestApp::new().await;
    let seller = app.seed_seller(true).await;
    let product = app.seed_product(seller.id, dec!(5), 500, None).await;
    let buyer = Uuid::new_v4();
    let address = app.seed_address(buyer, "Accra").await;

    let lines = (0..101).map(|_| item(product.id, 1)).collect();
    assert_matches!(
        app.orders
            .create_order(buyer, order_request(address.id, lines, "pay_on_delivery"))
            .await,
        Err(ServiceError::ValidationError(msg)) if msg.contains("100")
    );
}
