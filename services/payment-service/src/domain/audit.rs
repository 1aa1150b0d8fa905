use chrono::{DateTime, Utc};
use serde::Serialize;

// Append-only audit record per payment state transition
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PaymentAuditLog {
    pub id: i32,
    pub payment_id: i32,
    pub action: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Label aksi yang dicatat di audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    StatusUpdate,
    StatusSync,
    RefundInitiated,
    RetryInitiated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StatusUpdate => "STATUS_UPDATE",
            AuditAction::StatusSync => "STATUS_SYNC",
            AuditAction::RefundInitiated => "REFUND_INITIATED",
            AuditAction::RetryInitiated => "RETRY_INITIATED",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
