use crate::domain::audit::{AuditAction, PaymentAuditLog};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

// Audit trail append-only: tidak ada method update atau delete di interface
// ini, dan tidak boleh ada
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append<'a>(
        &self,
        payment_id: i32,
        action: AuditAction,
        old_value: Option<&'a str>,
        new_value: Option<&'a str>,
    ) -> Result<PaymentAuditLog, AppError>;

    async fn list_for_payment(&self, payment_id: i32) -> Result<Vec<PaymentAuditLog>, AppError>;

    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PaymentAuditLog>, AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i32,
    payment_id: i32,
    action: String,
    old_value: Option<String>,
    new_value: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for PaymentAuditLog {
    fn from(row: AuditRow) -> Self {
        PaymentAuditLog {
            id: row.id,
            payment_id: row.payment_id,
            action: row.action,
            old_value: row.old_value,
            new_value: row.new_value,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    async fn append<'a>(
        &self,
        payment_id: i32,
        action: AuditAction,
        old_value: Option<&'a str>,
        new_value: Option<&'a str>,
    ) -> Result<PaymentAuditLog, AppError> {
        let row = sqlx::query_as::<_, AuditRow>(
            "INSERT INTO payment_audit_logs (payment_id, action, old_value, new_value) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, payment_id, action, old_value, new_value, created_at",
        )
        .bind(payment_id)
        .bind(action.as_str())
        .bind(old_value)
        .bind(new_value)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_for_payment(&self, payment_id: i32) -> Result<Vec<PaymentAuditLog>, AppError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, payment_id, action, old_value, new_value, created_at \
             FROM payment_audit_logs WHERE payment_id = $1 ORDER BY created_at ASC",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PaymentAuditLog::from).collect())
    }

    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<PaymentAuditLog>, AppError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, payment_id, action, old_value, new_value, created_at \
             FROM payment_audit_logs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PaymentAuditLog::from).collect())
    }
}
