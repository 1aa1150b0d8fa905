use crate::domain::order::{Order, OrderPaymentStatus, OrderStatus};
use crate::error::AppError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

// Order adalah collaborator eksternal; service ini hanya membaca row dan
// memajukan kolom status lewat Status Reconciler
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<Order>, AppError>;

    async fn apply_payment_outcome(
        &self,
        order_id: i32,
        status: OrderStatus,
        payment_status: OrderPaymentStatus,
    ) -> Result<(), AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    order_number: String,
    customer_email: String,
    status: String,
    payment_status: String,
    total_amount: BigDecimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            user_id: row.user_id,
            order_number: row.order_number,
            customer_email: row.customer_email,
            status: OrderStatus::parse_db(&row.status),
            payment_status: OrderPaymentStatus::parse_db(&row.payment_status),
            total_amount: row.total_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn find_by_id(&self, id: i32) -> Result<Option<Order>, AppError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, order_number, customer_email, status, payment_status, \
                    total_amount, created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    async fn apply_payment_outcome(
        &self,
        order_id: i32,
        status: OrderStatus,
        payment_status: OrderPaymentStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
