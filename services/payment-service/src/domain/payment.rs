use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Model data payment transaction (satu payment per order)
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Payment {
    pub id: i32,
    pub order_id: i32,

    // Stripe identifiers
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_charge_id: Option<String>,

    // Amount & currency (amount immutable setelah insert)
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,

    pub payment_method: PaymentMethodKind,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Status payment lokal; hanya Status Reconciler yang boleh mengubahnya
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    // Parse dari kolom varchar; nilai tak dikenal dianggap Failed (fail closed)
    pub fn parse_db(value: &str) -> PaymentStatus {
        match value {
            "pending" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "succeeded" => PaymentStatus::Succeeded,
            "failed" => PaymentStatus::Failed,
            "canceled" => PaymentStatus::Canceled,
            "refunded" => PaymentStatus::Refunded,
            "partially_refunded" => PaymentStatus::PartiallyRefunded,
            _ => PaymentStatus::Failed,
        }
    }

    /// Transition table: PENDING -> PROCESSING -> {SUCCEEDED|FAILED},
    /// SUCCEEDED -> {REFUNDED|PARTIALLY_REFUNDED}, CANCELED dari
    /// PENDING/PROCESSING. Retry (FAILED -> PENDING) bukan transition biasa,
    /// itu operasi operator tersendiri.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Succeeded)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (Processing, Succeeded)
                | (Processing, Failed)
                | (Processing, Canceled)
                | (Succeeded, Refunded)
                | (Succeeded, PartiallyRefunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Failed | PaymentStatus::Canceled
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Metode pembayaran; saat ini gateway hanya dikonfigurasi untuk card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, utoipa::ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Card,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Card => "card",
        }
    }

    pub fn parse_db(value: &str) -> PaymentMethodKind {
        match value {
            "card" => PaymentMethodKind::Card,
            _ => PaymentMethodKind::Card,
        }
    }
}

// Request buat payment intent baru
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreatePaymentIntentRequest {
    pub order_id: i32,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_email: String,
}

// Request konfirmasi payment dari client (hint, bukan source of truth)
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

// Response create intent: client secret dipakai frontend untuk menyelesaikan
// pembayaran di sisi Stripe
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,
}

// View payment untuk API response
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentView {
    pub id: i32,
    pub order_id: i32,
    pub stripe_payment_intent_id: Option<String>,
    pub stripe_charge_id: Option<String>,
    #[schema(value_type = String)]
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethodKind,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentView {
    fn from(payment: &Payment) -> Self {
        PaymentView {
            id: payment.id,
            order_id: payment.order_id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
            stripe_charge_id: payment.stripe_charge_id.clone(),
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            payment_method: payment.payment_method,
            status: payment.status,
            failure_reason: payment.failure_reason.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

// Data baru untuk insert payment PENDING
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i32,
    pub stripe_payment_intent_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub payment_method: PaymentMethodKind,
}

// Agregat analytics untuk admin dashboard
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PaymentAnalytics {
    #[schema(value_type = String)]
    pub total_revenue: BigDecimal,
    pub total_transactions: i64,
    pub successful_transactions: i64,
    pub failed_transactions: i64,
    pub success_rate: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_allows_listed_paths() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Processing.can_transition_to(Succeeded));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Canceled));
        assert!(Succeeded.can_transition_to(Refunded));
        assert!(Succeeded.can_transition_to(PartiallyRefunded));
    }

    #[test]
    fn test_transition_table_rejects_everything_else() {
        use PaymentStatus::*;
        let all = [
            Pending,
            Processing,
            Succeeded,
            Failed,
            Canceled,
            Refunded,
            PartiallyRefunded,
        ];

        // Terminal states tidak punya jalan keluar lewat transition biasa
        for next in all {
            assert!(!Failed.can_transition_to(next), "failed -> {}", next);
            assert!(!Canceled.can_transition_to(next), "canceled -> {}", next);
            assert!(!Refunded.can_transition_to(next), "refunded -> {}", next);
        }

        // Succeeded hanya boleh masuk refund states
        assert!(!Succeeded.can_transition_to(Pending));
        assert!(!Succeeded.can_transition_to(Processing));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Succeeded.can_transition_to(Canceled));
    }

    #[test]
    fn test_parse_db_round_trip() {
        use PaymentStatus::*;
        for status in [
            Pending,
            Processing,
            Succeeded,
            Failed,
            Canceled,
            Refunded,
            PartiallyRefunded,
        ] {
            assert_eq!(PaymentStatus::parse_db(status.as_str()), status);
        }
    }

    #[test]
    fn test_parse_db_unknown_fails_closed() {
        assert_eq!(PaymentStatus::parse_db("garbage"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::parse_db(""), PaymentStatus::Failed);
    }
}
