use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Order adalah collaborator eksternal: dibuat oleh checkout flow, payment
// service hanya membaca dan memajukan status lewat Status Reconciler
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Order {
    pub id: i32,
    pub user_id: i32,
    pub order_number: String,
    pub customer_email: String,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    #[schema(value_type = String)]
    pub total_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_db(value: &str) -> OrderStatus {
        match value {
            "confirmed" => OrderStatus::Confirmed,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            _ => OrderStatus::Pending,
        }
    }
}

// Status pembayaran dari sudut pandang order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Completed => "completed",
            OrderPaymentStatus::Failed => "failed",
        }
    }

    pub fn parse_db(value: &str) -> OrderPaymentStatus {
        match value {
            "completed" => OrderPaymentStatus::Completed,
            "failed" => OrderPaymentStatus::Failed,
            _ => OrderPaymentStatus::Pending,
        }
    }
}
