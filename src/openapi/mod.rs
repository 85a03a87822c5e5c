use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        version = "1.0.0",
        description = r#"
# Marketplace Order API

Order creation and multi-seller settlement for the marketplace.

## Features

- **Server-side pricing**: every line is priced from the catalog; client prices are informational
- **Coupons**: percentage or fixed discounts, scoped to products, categories or sellers
- **Shipping**: zone-based quotes with weight tiers, speed multipliers and a same-day cutoff
- **Seller split**: each order is divided into per-seller slices with commission and payout
- **Stored balance**: wallet payments settle inside the order transaction

## Authentication

Every endpoint requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one body:

```json
{
  "status": "error",
  "error": "Conflict",
  "message": "Insufficient stock: BLU-M has 0 left, 1 requested",
  "request_id": "3f1c...",
  "timestamp": "2026-03-02T10:30:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order creation and lifecycle"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::validate_cart,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::confirm_payment,
        crate::handlers::orders::delete_order,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::ConfirmPaymentRequest,
            crate::services::orders::CartQuote,
            crate::services::orders::QuoteLine,
            crate::services::orders::DeleteOutcome,
            crate::services::order_detail::OrderDetail,
            crate::services::order_detail::OrderItemView,
            crate::services::order_detail::SellerOrderView,
            crate::services::order_detail::TrackingEntry,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::entities::order::PaymentStatus,
            crate::entities::order::DeliveryMethod,
            crate::entities::order::DeliverySpeed,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_order_route() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Marketplace API"));
        assert!(json.contains("/api/v1/order/validate-cart"));
        assert!(json.contains("/api/v1/order/{id}/confirm-payment"));
        assert!(json.contains("\"Bearer\""));
    }
}
