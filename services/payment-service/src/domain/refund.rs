use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Refund record; banyak refund boleh menunjuk satu payment selama total
// non-failed tidak melebihi amount yang benar-benar di-capture gateway
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Refund {
    pub id: i32,
    pub payment_id: i32,
    pub stripe_refund_id: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Status refund seperti dilaporkan gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Failed => "failed",
        }
    }

    pub fn parse_db(value: &str) -> RefundStatus {
        match value {
            "succeeded" => RefundStatus::Succeeded,
            "failed" => RefundStatus::Failed,
            _ => RefundStatus::Pending,
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Request refund dari admin
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefundRequest {
    pub payment_intent_id: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub reason: Option<String>,
}

// View refund untuk API response
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RefundView {
    pub refund_id: i32,
    pub stripe_refund_id: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub status: RefundStatus,
    pub processed_at: DateTime<Utc>,
}

impl From<&Refund> for RefundView {
    fn from(refund: &Refund) -> Self {
        RefundView {
            refund_id: refund.id,
            stripe_refund_id: refund.stripe_refund_id.clone(),
            amount: refund.amount.clone(),
            status: refund.status,
            processed_at: refund.created_at,
        }
    }
}

// Data baru untuk insert refund PENDING
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub payment_id: i32,
    pub stripe_refund_id: String,
    pub amount: BigDecimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
}
