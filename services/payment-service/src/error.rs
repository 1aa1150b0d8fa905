use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

// Struktur response error yang konsisten untuk semua endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// Taxonomy error payment service. Retryable (GatewayUnavailable) dan terminal
// (InvalidRefundState dll) sengaja dipisah per-variant supaya caller bisa
// membedakan secara programatik, bukan lewat inspeksi message string.
#[derive(Debug)]
pub enum AppError {
    DatabaseError(sqlx::Error),
    ValidationError(String),
    UnauthorizedError(String),
    ForbiddenError(String),
    OrderNotFound(String),
    PaymentNotFound(String),
    DuplicatePayment(String),
    InvalidSignature(String),
    GatewayUnavailable(String),
    GatewayRejected(String),
    InvalidRefundState(String),
    PaymentNotCaptured(String),
    RefundExceedsCaptured(String),
    TokenError(String),
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::UnauthorizedError(msg) => write!(f, "Unauthorized error: {}", msg),
            AppError::ForbiddenError(msg) => write!(f, "Forbidden error: {}", msg),
            AppError::OrderNotFound(msg) => write!(f, "Order not found: {}", msg),
            AppError::PaymentNotFound(msg) => write!(f, "Payment not found: {}", msg),
            AppError::DuplicatePayment(msg) => write!(f, "Duplicate payment: {}", msg),
            AppError::InvalidSignature(msg) => write!(f, "Invalid signature: {}", msg),
            AppError::GatewayUnavailable(msg) => write!(f, "Gateway unavailable: {}", msg),
            AppError::GatewayRejected(msg) => write!(f, "Gateway rejected: {}", msg),
            AppError::InvalidRefundState(msg) => write!(f, "Invalid refund state: {}", msg),
            AppError::PaymentNotCaptured(msg) => write!(f, "Payment not captured: {}", msg),
            AppError::RefundExceedsCaptured(msg) => write!(f, "Refund exceeds captured: {}", msg),
            AppError::TokenError(msg) => write!(f, "Token error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// Konversi dari sqlx::Error ke AppError
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

// Konversi dari jsonwebtoken::errors::Error ke AppError
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::TokenError(err.to_string())
    }
}

// Implementasi IntoResponse agar AppError bisa langsung jadi response axum
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::UnauthorizedError(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            AppError::ForbiddenError(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::OrderNotFound(msg) => {
                (StatusCode::NOT_FOUND, "order_not_found", msg.clone())
            }
            AppError::PaymentNotFound(msg) => {
                (StatusCode::NOT_FOUND, "payment_not_found", msg.clone())
            }
            AppError::DuplicatePayment(msg) => {
                (StatusCode::CONFLICT, "duplicate_payment", msg.clone())
            }
            AppError::InvalidSignature(msg) => {
                tracing::warn!("Webhook signature rejected: {}", msg);
                (StatusCode::BAD_REQUEST, "invalid_signature", msg.clone())
            }
            AppError::GatewayUnavailable(msg) => {
                tracing::error!("Payment gateway unavailable: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_unavailable",
                    "Payment gateway unavailable, please retry".to_string(),
                )
            }
            AppError::GatewayRejected(msg) => {
                tracing::error!("Payment gateway rejected request: {}", msg);
                // Pesan rejection gateway diteruskan verbatim: admin butuh
                // detailnya untuk judgement call
                (StatusCode::BAD_REQUEST, "gateway_rejected", msg.clone())
            }
            AppError::InvalidRefundState(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_refund_state", msg.clone())
            }
            AppError::PaymentNotCaptured(msg) => {
                (StatusCode::BAD_REQUEST, "payment_not_captured", msg.clone())
            }
            AppError::RefundExceedsCaptured(msg) => (
                StatusCode::BAD_REQUEST,
                "refund_exceeds_captured",
                msg.clone(),
            ),
            AppError::TokenError(msg) => {
                tracing::debug!("Token rejected: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    "token_error",
                    "Token invalid or expired".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let details = if cfg!(debug_assertions) {
            Some(self.to_string())
        } else {
            None
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(error_response)).into_response()
    }
}

// Helper functions untuk membuat error dengan mudah
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::UnauthorizedError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::ForbiddenError(msg.into())
    }

    pub fn order_not_found(msg: impl Into<String>) -> Self {
        AppError::OrderNotFound(msg.into())
    }

    pub fn payment_not_found(msg: impl Into<String>) -> Self {
        AppError::PaymentNotFound(msg.into())
    }

    pub fn duplicate_payment(msg: impl Into<String>) -> Self {
        AppError::DuplicatePayment(msg.into())
    }

    pub fn invalid_signature(msg: impl Into<String>) -> Self {
        AppError::InvalidSignature(msg.into())
    }

    pub fn gateway_unavailable(msg: impl Into<String>) -> Self {
        AppError::GatewayUnavailable(msg.into())
    }

    pub fn invalid_refund_state(msg: impl Into<String>) -> Self {
        AppError::InvalidRefundState(msg.into())
    }

    pub fn payment_not_captured(msg: impl Into<String>) -> Self {
        AppError::PaymentNotCaptured(msg.into())
    }

    pub fn refund_exceeds_captured(msg: impl Into<String>) -> Self {
        AppError::RefundExceedsCaptured(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalError(msg.into())
    }
}

// Type alias untuk Result dengan AppError sebagai error type
pub type AppResult<T> = Result<T, AppError>;
