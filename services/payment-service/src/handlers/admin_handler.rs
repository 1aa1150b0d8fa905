// Admin endpoints: refund, manual sync, dan reporting. Semua handler di sini
// menolak caller tanpa role admin.

use crate::config::AppState;
use crate::domain::payment::{PaymentStatus, PaymentView};
use crate::domain::refund::{RefundRequest, RefundView};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::IntoParams;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

fn require_admin(auth: &AuthUser) -> AppResult<()> {
    if auth.role != "admin" {
        return Err(AppError::forbidden("Admin role required"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
}

impl PageQuery {
    fn limit_offset(&self) -> (i64, i64) {
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);
        (per_page, (page - 1) * per_page)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub payment_id: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AnalyticsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Proses refund (admin only)
#[utoipa::path(
    post,
    path = "/api/payments/refund",
    tag = "Payment Service - Admin",
    summary = "Process refund",
    description = "Validates refund eligibility against local and gateway state, submits the refund to Stripe, and records it with status pending",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund submitted", body = serde_json::Value),
        (status = 400, description = "Invalid refund state, amount exceeds captured, or gateway rejection"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn process_refund(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let refund = app_state.refunds.process_refund(&request).await?;

    tracing::info!(
        "Admin {} memproses refund {} sebesar {} untuk intent {}",
        auth.user_id,
        refund.stripe_refund_id,
        refund.amount,
        request.payment_intent_id
    );

    Ok(Json(json!({
        "success": true,
        "data": RefundView::from(&refund)
    })))
}

/// Semua refund (admin only)
#[utoipa::path(
    get,
    path = "/api/payments/refunds",
    tag = "Payment Service - Admin",
    summary = "List refunds",
    responses(
        (status = 200, description = "Refunds retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_refunds(
    auth: AuthUser,
    State(app_state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let refunds = app_state.refund_store.list_all().await?;
    let views: Vec<RefundView> = refunds.iter().map(RefundView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": views,
        "count": views.len()
    })))
}

/// Force sync status payment dengan gateway (admin only)
#[utoipa::path(
    post,
    path = "/api/payments/sync-status/{payment_intent_id}",
    tag = "Payment Service - Admin",
    summary = "Sync payment status with gateway",
    description = "Re-fetches the authoritative intent status from Stripe and reconciles the local payment; used when webhook delivery is suspected lost",
    params(
        ("payment_intent_id" = String, Path, description = "Stripe payment intent ID")
    ),
    responses(
        (status = 200, description = "Payment reconciled", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sync_payment_status(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let payment = app_state
        .reconciler
        .sync_with_gateway(&payment_intent_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": PaymentView::from(&payment)
    })))
}

/// Daftar payment dengan pagination dan filter status (admin only)
#[utoipa::path(
    get,
    path = "/api/admin/payments",
    tag = "Payment Service - Admin",
    summary = "List payments",
    params(PageQuery),
    responses(
        (status = 200, description = "Payments retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_payments(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    // Filter status eksplisit; string tak dikenal ditolak, bukan
    // diam-diam di-parse fail-closed jadi failed
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => {
            let parsed = PaymentStatus::parse_db(raw);
            if parsed.as_str() != raw {
                return Err(AppError::validation(format!("Unknown status '{}'", raw)));
            }
            Some(parsed)
        }
    };

    let (limit, offset) = query.limit_offset();
    let payments = app_state.payments.list_page(status, limit, offset).await?;
    let views: Vec<PaymentView> = payments.iter().map(PaymentView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": views,
        "count": views.len()
    })))
}

/// Revenue dan success-rate analytics (admin only)
#[utoipa::path(
    get,
    path = "/api/admin/payments/analytics",
    tag = "Payment Service - Admin",
    summary = "Payment analytics",
    description = "Revenue total, transaction counts, and success rate over a date range (defaults to the last 30 days)",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Analytics computed", body = serde_json::Value),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn payment_analytics(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let period_end = query.end_date.unwrap_or_else(Utc::now);
    let period_start = query
        .start_date
        .unwrap_or_else(|| period_end - Duration::days(30));

    if period_start >= period_end {
        return Err(AppError::validation("start_date must be before end_date"));
    }

    let analytics = app_state.payments.analytics(period_start, period_end).await?;

    Ok(Json(json!({
        "success": true,
        "data": analytics
    })))
}

/// Audit trail payment (admin only)
#[utoipa::path(
    get,
    path = "/api/admin/payments/audit-log",
    tag = "Payment Service - Admin",
    summary = "Payment audit trail",
    description = "Append-only status transition history, newest first; pass payment_id for the full ordered trail of a single payment",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn audit_log(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let entries = match query.payment_id {
        Some(payment_id) => app_state.audit.list_for_payment(payment_id).await?,
        None => {
            let paging = PageQuery {
                page: query.page,
                per_page: query.per_page,
                status: None,
            };
            let (limit, offset) = paging.limit_offset();
            app_state.audit.list_page(limit, offset).await?
        }
    };

    Ok(Json(json!({
        "success": true,
        "data": entries,
        "count": entries.len()
    })))
}

/// Payment yang gagal (admin only)
#[utoipa::path(
    get,
    path = "/api/admin/payments/failed",
    tag = "Payment Service - Admin",
    summary = "List failed payments",
    params(PageQuery),
    responses(
        (status = 200, description = "Failed payments retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn failed_payments(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&auth)?;

    let (limit, offset) = query.limit_offset();
    let payments = app_state
        .payments
        .list_page(Some(PaymentStatus::Failed), limit, offset)
        .await?;
    let views: Vec<PaymentView> = payments.iter().map(PaymentView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": views,
        "count": views.len()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "admin@example.com".to_string(),
            role: "admin".to_string(),
        }
    }

    fn customer() -> AuthUser {
        AuthUser {
            user_id: 2,
            email: "buyer@example.com".to_string(),
            role: "customer".to_string(),
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&admin()).is_ok());
        assert!(matches!(
            require_admin(&customer()).unwrap_err(),
            AppError::ForbiddenError(_)
        ));
    }

    #[test]
    fn test_page_query_defaults_and_clamping() {
        let query = PageQuery {
            page: None,
            per_page: None,
            status: None,
        };
        assert_eq!(query.limit_offset(), (DEFAULT_PAGE_SIZE, 0));

        let query = PageQuery {
            page: Some(3),
            per_page: Some(10),
            status: None,
        };
        assert_eq!(query.limit_offset(), (10, 20));

        let query = PageQuery {
            page: Some(0),
            per_page: Some(100_000),
            status: None,
        };
        assert_eq!(query.limit_offset(), (MAX_PAGE_SIZE, 0));
    }
}
