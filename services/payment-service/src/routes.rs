// API Routes untuk Payment Service dengan JWT-Only architecture

use crate::config::AppState;
use crate::handlers::{admin_handler, payment_handler, webhook_handler};
use crate::middleware::auth::jwt_auth_middleware;
use axum::{
    extract::Request,
    http::{header::HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// OpenAPI Documentation untuk Payment Service
#[derive(OpenApi)]
#[openapi(
    paths(
        payment_handler::create_payment_intent,
        payment_handler::confirm_payment,
        payment_handler::get_payment_history,
        payment_handler::get_payment_by_order,
        payment_handler::get_payment_by_intent,
        payment_handler::retry_payment,
        payment_handler::health_check,
        webhook_handler::stripe_webhook,
        admin_handler::process_refund,
        admin_handler::list_refunds,
        admin_handler::sync_payment_status,
        admin_handler::list_payments,
        admin_handler::payment_analytics,
        admin_handler::audit_log,
        admin_handler::failed_payments,
    ),
    components(
        schemas(
            crate::domain::payment::CreatePaymentIntentRequest,
            crate::domain::payment::ConfirmPaymentRequest,
            crate::domain::payment::PaymentIntentResponse,
            crate::domain::payment::Payment,
            crate::domain::payment::PaymentView,
            crate::domain::payment::PaymentStatus,
            crate::domain::payment::PaymentMethodKind,
            crate::domain::payment::PaymentAnalytics,
            crate::domain::refund::RefundRequest,
            crate::domain::refund::RefundView,
            crate::domain::refund::RefundStatus,
            crate::domain::audit::PaymentAuditLog,
        )
    ),
    tags(
        (name = "Payment Service", description = "Payment intent, confirmation, and webhook endpoints"),
        (name = "Payment Service - Admin", description = "Refunds, manual reconciliation, and reporting")
    ),
    info(
        title = "Payment Service API",
        description = "Payment processing & reconciliation service for Harsh Commerce with Stripe integration\n\n## Features\n\n- 💳 Stripe payment intent integration\n- 🔒 JWT-Only authentication\n- 🔁 Webhook ingestion with signature verification\n- 📊 Status reconciliation and immutable audit trail\n- 💰 Admin refunds with captured-amount validation",
        version = "1.0.0",
        contact(
            name = "Harsh Commerce Support",
            email = "support@harshcommerce.com"
        )
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub struct ApiDoc;

// Security scheme modifier untuk Bearer JWT authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

// Security headers middleware
async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "Content-Security-Policy",
        "default-src 'self'; frame-ancestors 'none';".parse().unwrap(),
    );
    headers.insert("X-Content-Type-Options", "nosniff".parse().unwrap());
    headers.insert("X-Frame-Options", "DENY".parse().unwrap());
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".parse().unwrap(),
    );
    headers.insert(
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains".parse().unwrap(),
    );

    response
}

// Buat router: public (health, docs, webhook) + protected API dengan JWT
pub async fn create_routes(state: AppState) -> Router {
    if state.config.is_production() {
        tracing::warn!("Payment Service running in PRODUCTION mode");
    } else {
        tracing::info!("Payment Service running in DEVELOPMENT mode");
    }

    if state.config.skip_signature_verification {
        tracing::warn!(
            "⚠️  WEBHOOK SIGNATURE VERIFICATION DISABLED - jangan pernah aktifkan ini di production"
        );
    }

    // CORS configuration
    let allowed_origin = state
        .config
        .frontend_url
        .parse::<HeaderValue>()
        .expect("FRONTEND_URL harus valid URL format");

    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(false)
        .max_age(Duration::from_secs(86400));

    // Setup OpenAPI documentation
    let mut openapi = ApiDoc::openapi();
    SecurityAddon.modify(&mut openapi);

    // Public routes - tanpa JWT; webhook diverifikasi lewat signature
    let public_routes = Router::new()
        .route("/health", get(payment_handler::health_check))
        .route("/api/webhooks/stripe", post(webhook_handler::stripe_webhook))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi))
        .with_state(state.clone());

    // Protected API routes - dengan JWT authentication
    let protected_routes = build_api_routes(state.clone()).layer(
        axum::middleware::from_fn_with_state(state.clone(), jwt_auth_middleware),
    );

    public_routes
        .nest("/api", protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(30),
                ))
                .layer(cors),
        )
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

// Build API routes dengan JWT authentication
fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // ===== Payment Operations =====
        .route(
            "/payments/create-payment-intent",
            post(payment_handler::create_payment_intent),
        )
        .route(
            "/payments/confirm-payment",
            post(payment_handler::confirm_payment),
        )
        .route("/payments/history", get(payment_handler::get_payment_history))
        .route(
            "/payments/order/{order_id}",
            get(payment_handler::get_payment_by_order),
        )
        .route(
            "/payments/retry/{payment_intent_id}",
            post(payment_handler::retry_payment),
        )
        .route(
            "/payments/{payment_intent_id}",
            get(payment_handler::get_payment_by_intent),
        )
        // ===== Refund & Reconciliation (admin) =====
        .route("/payments/refund", post(admin_handler::process_refund))
        .route("/payments/refunds", get(admin_handler::list_refunds))
        .route(
            "/payments/sync-status/{payment_intent_id}",
            post(admin_handler::sync_payment_status),
        )
        // ===== Admin Reporting =====
        .route("/admin/payments", get(admin_handler::list_payments))
        .route(
            "/admin/payments/analytics",
            get(admin_handler::payment_analytics),
        )
        .route("/admin/payments/audit-log", get(admin_handler::audit_log))
        .route("/admin/payments/failed", get(admin_handler::failed_payments))
        .with_state(state)
}
