use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::telemetry::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "error",
    "error": "Conflict",
    "message": "Insufficient stock: variant BLU-M has 0 left, 1 requested",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-03-02T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Always `"error"`
    #[schema(example = "error")]
    pub status: String,
    /// HTTP status category
    #[schema(example = "Conflict")]
    pub error: String,
    /// Human-readable reason
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

/// Reasons a coupon code can be refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum CouponError {
    #[error("coupon code not found")]
    NotFound,
    #[error("coupon is not valid at this time")]
    Expired,
    #[error("coupon has already been used")]
    AlreadyUsed,
    #[error("order amount is below the coupon minimum of {0}")]
    MinimumNotMet(Decimal),
    #[error("coupon does not apply to any item in this cart")]
    ScopeMismatch,
    #[error("coupon usage limit has been reached")]
    UsageCapReached,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Product not orderable: {0}")]
    ProductNotOrderable(String),

    #[error("Seller could not be resolved for product {0}")]
    SellerUnresolved(Uuid),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponError),

    #[error("Insufficient wallet balance: required {required}, available {available}")]
    InsufficientWalletBalance { required: Decimal, available: Decimal },

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Same-day and express delivery cutoff has passed; choose standard delivery")]
    CutoffPassed,

    #[error("Dependency error: {0}")]
    DependencyError(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Order creation timed out")]
    OrderCreationTimeout,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::ProductNotOrderable(_) | Self::CutoffPassed => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::JwtError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Coupon(err) => match err {
                CouponError::NotFound => StatusCode::NOT_FOUND,
                CouponError::AlreadyUsed | CouponError::UsageCapReached => StatusCode::CONFLICT,
                CouponError::Expired
                | CouponError::MinimumNotMet(_)
                | CouponError::ScopeMismatch => StatusCode::BAD_REQUEST,
            },
            Self::InsufficientStock(_)
            | Self::InsufficientWalletBalance { .. }
            | Self::InvalidTransition(_)
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::SellerUnresolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::OrderCreationTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_)
            | Self::DependencyError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }

    /// True for failures that are the caller's fault and need no stack-level logging.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ErrorResponse {
            status: "error".to_string(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}
