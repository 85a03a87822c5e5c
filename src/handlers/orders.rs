use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{
        order_detail::OrderDetail,
        orders::{
            CartQuote, ConfirmPaymentRequest, CreateOrderRequest, DeleteOutcome,
            UpdateOrderStatusRequest,
        },
    },
    ApiResponse, AppState,
};

/// Routes mounted under `/api/v1/order`.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/validate-cart", post(validate_cart))
        .route(
            "/:id",
            get(get_order)
                .patch(update_order_status)
                .delete(delete_order),
        )
        .route("/:id/confirm-payment", post(confirm_payment))
}

#[utoipa::path(
    post,
    path = "/api/v1/order",
    summary = "Create order",
    description = "Prices the cart from the catalog, applies the coupon, quotes shipping, splits the order per seller and settles stored-balance payments. Client prices are never charged.",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderDetail>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid cart, address or delivery option", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product, address or coupon", body = crate::errors::ErrorResponse),
        (status = 409, description = "Out of stock, coupon exhausted or balance too low", body = crate::errors::ErrorResponse),
        (status = 503, description = "Order creation timed out", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .create_order(auth_user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(
    post,
    path = "/api/v1/order/validate-cart",
    summary = "Quote a cart",
    description = "Runs the same pricing, coupon, shipping and split steps as order creation without writing anything.",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Cart priced", body = ApiResponse<CartQuote>),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product, address or coupon", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn validate_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<CartQuote>>, ServiceError> {
    let quote = state
        .services
        .orders
        .validate_cart(auth_user.user_id, &request)
        .await?;
    Ok(Json(ApiResponse::success(quote)))
}

#[utoipa::path(
    get,
    path = "/api/v1/order/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetail>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to someone else", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id, auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/order/{id}",
    summary = "Update order status",
    description = "Moves the order along its lifecycle. Legacy status names are accepted. Stock, seller revenue and wallet refunds follow the move.",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller may not make this change", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed or order changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(id, auth_user.actor(), request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/order/{id}/confirm-payment",
    summary = "Confirm a deferred payment",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<OrderDetail>),
        (status = 403, description = "Staff only", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let order = state
        .services
        .orders
        .confirm_payment(id, auth_user.actor(), request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/order/{id}",
    summary = "Cancel or delete order",
    description = "Buyers cancel and archive orders that have not shipped. Admins delete the order after snapshotting it to the audit log.",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled or deleted", body = ApiResponse<DeleteOutcome>),
        (status = 403, description = "Caller may not remove this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<DeleteOutcome>>, ServiceError> {
    let outcome = state
        .services
        .orders
        .cancel_or_delete(id, auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
