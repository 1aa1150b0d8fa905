use crate::config::AppState;
use crate::domain::payment::{
    ConfirmPaymentRequest, CreatePaymentIntentRequest, PaymentView,
};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::{json, Value};
use utoipa;

/// Create payment intent untuk sebuah order
#[utoipa::path(
    post,
    path = "/api/payments/create-payment-intent",
    tag = "Payment Service",
    summary = "Create payment intent",
    description = "Create a Stripe payment intent for an order and persist a pending payment record",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created", body = serde_json::Value),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Payment already exists for this order"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_payment_intent(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Result<Json<Value>, AppError> {
    let response = app_state.intents.create_intent(auth.user_id, &request).await?;

    tracing::info!(
        "Payment intent {} dibuat oleh user {}",
        response.payment_intent_id,
        auth.user_id
    );

    Ok(Json(json!({
        "success": true,
        "data": response
    })))
}

/// Confirm payment dengan re-query status gateway
#[utoipa::path(
    post,
    path = "/api/payments/confirm-payment",
    tag = "Payment Service",
    summary = "Confirm payment",
    description = "Re-reads the authoritative intent status from Stripe and reconciles the local payment; the request body is a hint, never a source of truth",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment reconciled", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Payment belongs to another user"),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Payment gateway unavailable")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn confirm_payment(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let payment = app_state
        .intents
        .confirm_intent(auth.user_id, &request.payment_intent_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": PaymentView::from(&payment)
    })))
}

/// Payment history user yang sedang login
#[utoipa::path(
    get,
    path = "/api/payments/history",
    tag = "Payment Service",
    summary = "Get payment history",
    description = "Payment history of the authenticated user, newest first",
    responses(
        (status = 200, description = "Payment history retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_payment_history(
    auth: AuthUser,
    State(app_state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let payments = app_state.payments.find_by_user(auth.user_id).await?;
    let views: Vec<PaymentView> = payments.iter().map(PaymentView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": views,
        "count": views.len()
    })))
}

/// Payment milik satu order
#[utoipa::path(
    get,
    path = "/api/payments/order/{order_id}",
    tag = "Payment Service",
    summary = "Get payment by order",
    params(
        ("order_id" = i32, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Payment retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Order belongs to another user"),
        (status = 404, description = "Payment or order not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_payment_by_order(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let order = app_state
        .orders
        .find_by_id(order_id)
        .await?
        .ok_or_else(|| AppError::order_not_found(format!("Order {}", order_id)))?;

    if order.user_id != auth.user_id {
        return Err(AppError::forbidden("Order does not belong to this user"));
    }

    let payment = app_state
        .payments
        .find_by_order_id(order_id)
        .await?
        .ok_or_else(|| AppError::payment_not_found(format!("No payment for order {}", order_id)))?;

    Ok(Json(json!({
        "success": true,
        "data": PaymentView::from(&payment)
    })))
}

/// Payment by intent id
#[utoipa::path(
    get,
    path = "/api/payments/{payment_intent_id}",
    tag = "Payment Service",
    summary = "Get payment by intent id",
    params(
        ("payment_intent_id" = String, Path, description = "Stripe payment intent ID")
    ),
    responses(
        (status = 200, description = "Payment retrieved", body = serde_json::Value),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Payment belongs to another user"),
        (status = 404, description = "Payment not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_payment_by_intent(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let payment = app_state
        .intents
        .find_owned_payment(auth.user_id, &payment_intent_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": PaymentView::from(&payment)
    })))
}

/// Retry payment yang FAILED: reset ke PENDING
#[utoipa::path(
    post,
    path = "/api/payments/retry/{payment_intent_id}",
    tag = "Payment Service",
    summary = "Retry failed payment",
    description = "Resets a failed payment back to pending so the client can attempt payment again; audit-logged as RETRY_INITIATED",
    params(
        ("payment_intent_id" = String, Path, description = "Stripe payment intent ID")
    ),
    responses(
        (status = 200, description = "Payment reset to pending", body = serde_json::Value),
        (status = 400, description = "Payment is not in failed state"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Payment belongs to another user"),
        (status = 404, description = "Payment not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn retry_payment(
    auth: AuthUser,
    State(app_state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let payment = app_state
        .intents
        .find_owned_payment(auth.user_id, &payment_intent_id)
        .await?;

    let updated = app_state.reconciler.retry_failed_payment(&payment).await?;

    tracing::info!(
        "User {} me-retry payment {} ({})",
        auth.user_id,
        updated.id,
        payment_intent_id
    );

    Ok(Json(json!({
        "success": true,
        "message": "Payment reset for retry",
        "data": PaymentView::from(&updated)
    })))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Payment Service",
    summary = "Health check",
    responses(
        (status = 200, description = "Service health status", body = serde_json::Value)
    )
)]
pub async fn health_check(State(app_state): State<AppState>) -> Json<Value> {
    let health = app_state.health_check().await;

    Json(json!({
        "service": "payment-service",
        "version": app_state.config.app_version,
        "database": health.database,
        "status": health.overall
    }))
}
