use crate::domain::refund::{NewRefund, Refund, RefundStatus};
use crate::error::AppError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn insert(&self, new_refund: &NewRefund) -> Result<Refund, AppError>;

    /// Total amount refund non-failed untuk satu payment. Dipakai untuk
    /// menjaga invariant: sum(refund non-failed) <= captured amount.
    async fn total_refunded(&self, payment_id: i32) -> Result<BigDecimal, AppError>;

    async fn list_all(&self) -> Result<Vec<Refund>, AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: i32,
    payment_id: i32,
    stripe_refund_id: String,
    amount: BigDecimal,
    reason: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RefundRow> for Refund {
    fn from(row: RefundRow) -> Self {
        Refund {
            id: row.id,
            payment_id: row.payment_id,
            stripe_refund_id: row.stripe_refund_id,
            amount: row.amount,
            reason: row.reason,
            status: RefundStatus::parse_db(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct RefundRepository {
    pool: PgPool,
}

impl RefundRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundStore for RefundRepository {
    async fn insert(&self, new_refund: &NewRefund) -> Result<Refund, AppError> {
        let row = sqlx::query_as::<_, RefundRow>(
            "INSERT INTO refunds (payment_id, stripe_refund_id, amount, reason, status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, payment_id, stripe_refund_id, amount, reason, status, \
                       created_at, updated_at",
        )
        .bind(new_refund.payment_id)
        .bind(&new_refund.stripe_refund_id)
        .bind(&new_refund.amount)
        .bind(&new_refund.reason)
        .bind(new_refund.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn total_refunded(&self, payment_id: i32) -> Result<BigDecimal, AppError> {
        let total: BigDecimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::NUMERIC(14,2) \
             FROM refunds WHERE payment_id = $1 AND status <> 'failed'",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn list_all(&self) -> Result<Vec<Refund>, AppError> {
        let rows = sqlx::query_as::<_, RefundRow>(
            "SELECT id, payment_id, stripe_refund_id, amount, reason, status, \
                    created_at, updated_at \
             FROM refunds ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Refund::from).collect())
    }
}
