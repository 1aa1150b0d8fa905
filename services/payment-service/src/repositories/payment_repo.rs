use crate::domain::payment::{
    NewPayment, Payment, PaymentAnalytics, PaymentMethodKind, PaymentStatus,
};
use crate::error::AppError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

// Store interface payment; seam untuk mockall di component tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, new_payment: &NewPayment) -> Result<Payment, AppError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Payment>, AppError>;

    async fn find_by_order_id(&self, order_id: i32) -> Result<Option<Payment>, AppError>;

    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>, AppError>;

    async fn find_by_user(&self, user_id: i32) -> Result<Vec<Payment>, AppError>;

    /// Guarded status write: hanya commit kalau status masih `from`.
    /// `None` berarti writer lain menang race; caller harus re-read.
    async fn transition_guarded<'a>(
        &self,
        id: i32,
        from: PaymentStatus,
        to: PaymentStatus,
        failure_reason: Option<&'a str>,
    ) -> Result<Option<Payment>, AppError>;

    async fn set_charge_id(&self, id: i32, charge_id: &str) -> Result<(), AppError>;

    async fn list_page(
        &self,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payment>, AppError>;

    async fn analytics(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PaymentAnalytics, AppError>;
}

// Row mapping manual: status varchar diparse fail-closed di domain layer
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i32,
    order_id: i32,
    stripe_payment_intent_id: Option<String>,
    stripe_charge_id: Option<String>,
    amount: BigDecimal,
    currency: String,
    payment_method: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id,
            order_id: row.order_id,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            stripe_charge_id: row.stripe_charge_id,
            amount: row.amount,
            currency: row.currency,
            payment_method: PaymentMethodKind::parse_db(&row.payment_method),
            status: PaymentStatus::parse_db(&row.status),
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_PAYMENT: &str = "SELECT id, order_id, stripe_payment_intent_id, stripe_charge_id, \
     amount, currency, payment_method, status, failure_reason, created_at, updated_at \
     FROM payments";

// Repository untuk operasi database payment
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert(&self, new_payment: &NewPayment) -> Result<Payment, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO payments (order_id, stripe_payment_intent_id, amount, currency, payment_method, status) \
             VALUES ($1, $2, $3, $4, $5, 'pending') \
             RETURNING id, order_id, stripe_payment_intent_id, stripe_charge_id, amount, currency, \
                       payment_method, status, failure_reason, created_at, updated_at",
        )
        .bind(new_payment.order_id)
        .bind(&new_payment.stripe_payment_intent_id)
        .bind(&new_payment.amount)
        .bind(&new_payment.currency)
        .bind(new_payment.payment_method.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            // Unique constraint order_id: race dua create-intent pada order
            // yang sama kalah di sini, bukan jadi dua payment row
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::duplicate_payment("A payment already exists for this order")
            }
            _ => AppError::from(e),
        })?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Payment>, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!("{} WHERE id = $1", SELECT_PAYMENT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Payment::from))
    }

    async fn find_by_order_id(&self, order_id: i32) -> Result<Option<Payment>, AppError> {
        let row =
            sqlx::query_as::<_, PaymentRow>(&format!("{} WHERE order_id = $1", SELECT_PAYMENT))
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Payment::from))
    }

    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "{} WHERE stripe_payment_intent_id = $1",
            SELECT_PAYMENT
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Payment::from))
    }

    async fn find_by_user(&self, user_id: i32) -> Result<Vec<Payment>, AppError> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT p.id, p.order_id, p.stripe_payment_intent_id, p.stripe_charge_id, \
                    p.amount, p.currency, p.payment_method, p.status, p.failure_reason, \
                    p.created_at, p.updated_at \
             FROM payments p \
             JOIN orders o ON o.id = p.order_id \
             WHERE o.user_id = $1 \
             ORDER BY p.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn transition_guarded<'a>(
        &self,
        id: i32,
        from: PaymentStatus,
        to: PaymentStatus,
        failure_reason: Option<&'a str>,
    ) -> Result<Option<Payment>, AppError> {
        // Optimistic concurrency: WHERE status = from adalah version check.
        // Nol row berarti transisi konkuren sudah mendahului.
        let row = sqlx::query_as::<_, PaymentRow>(
            "UPDATE payments \
             SET status = $3, failure_reason = $4, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING id, order_id, stripe_payment_intent_id, stripe_charge_id, amount, currency, \
                       payment_method, status, failure_reason, created_at, updated_at",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Payment::from))
    }

    async fn set_charge_id(&self, id: i32, charge_id: &str) -> Result<(), AppError> {
        // COALESCE: charge id hanya diisi sekali, tidak pernah di-overwrite
        sqlx::query(
            "UPDATE payments \
             SET stripe_charge_id = COALESCE(stripe_charge_id, $2), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(charge_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_page(
        &self,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payment>, AppError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, PaymentRow>(&format!(
                    "{} WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                    SELECT_PAYMENT
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, PaymentRow>(&format!(
                    "{} ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                    SELECT_PAYMENT
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Payment::from).collect())
    }

    async fn analytics(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<PaymentAnalytics, AppError> {
        let row = sqlx::query(
            "SELECT \
                COALESCE(SUM(amount) FILTER (WHERE status = 'succeeded'), 0)::NUMERIC(14,2) AS total_revenue, \
                COUNT(*) AS total_transactions, \
                COUNT(*) FILTER (WHERE status = 'succeeded') AS successful_transactions, \
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_transactions \
             FROM payments \
             WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        let total_revenue: BigDecimal = row.try_get("total_revenue")?;
        let total_transactions: i64 = row.try_get("total_transactions")?;
        let successful_transactions: i64 = row.try_get("successful_transactions")?;
        let failed_transactions: i64 = row.try_get("failed_transactions")?;

        let success_rate = if total_transactions > 0 {
            successful_transactions as f64 / total_transactions as f64 * 100.0
        } else {
            0.0
        };

        Ok(PaymentAnalytics {
            total_revenue,
            total_transactions,
            successful_transactions,
            failed_transactions,
            success_rate,
            period_start,
            period_end,
        })
    }
}
