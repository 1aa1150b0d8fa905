// Payment Service Configuration

use crate::handlers::stripe_gateway::{PaymentGateway, StripeGateway};
use crate::intents::PaymentIntentManager;
use crate::reconciler::StatusReconciler;
use crate::refunds::RefundProcessor;
use crate::repositories::audit_repo::{AuditRepository, AuditStore};
use crate::repositories::order_repo::{OrderRepository, OrderStore};
use crate::repositories::payment_repo::{PaymentRepository, PaymentStore};
use crate::repositories::refund_repo::{RefundRepository, RefundStore};
use crate::utils::notify::{spawn_notification_worker, SmtpConfig};
use sqlx::{postgres::PgConnectOptions, postgres::PgPoolOptions, PgPool};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// Konfigurasi aplikasi dari environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub jwt_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_url: String,
    pub stripe_timeout_secs: u64,
    pub skip_signature_verification: bool,
    pub frontend_url: String,
    pub smtp: Option<SmtpConfig>,
    pub app_version: String,
}

impl AppConfig {
    // Load konfigurasi dari environment dengan validasi
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL harus diset")?;

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET harus diset")?;
        if !cfg!(debug_assertions) && jwt_secret.contains("change-this") {
            return Err("JWT_SECRET masih default! Ganti untuk production".to_string());
        }

        let server_host = env::var("PAYMENT_SERVICE_HOST")
            .map_err(|_| "PAYMENT_SERVICE_HOST harus diset di environment")?;

        let server_port = env::var("PAYMENT_SERVICE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or("PAYMENT_SERVICE_PORT harus diset di environment")?;

        let environment =
            env::var("RUST_ENV").map_err(|_| "RUST_ENV harus diset di environment")?;

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY")
            .map_err(|_| "STRIPE_SECRET_KEY harus diset di environment")?;

        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| "STRIPE_WEBHOOK_SECRET harus diset di environment")?;

        let stripe_api_url =
            env::var("STRIPE_API_URL").unwrap_or_else(|_| "https://api.stripe.com".to_string());

        let stripe_timeout_secs = env::var("STRIPE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let skip_signature_verification = env::var("STRIPE_SKIP_SIGNATURE_VERIFICATION")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        // Bypass signature hanya untuk development; production menolak boot
        if skip_signature_verification && environment == "production" {
            return Err(
                "STRIPE_SKIP_SIGNATURE_VERIFICATION tidak boleh aktif di production".to_string(),
            );
        }

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let app_version = env::var("APP_VERSION").unwrap_or_else(|_| "1.0.0".to_string());

        Ok(AppConfig {
            database_url,
            server_host,
            server_port,
            environment,
            jwt_secret,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_api_url,
            stripe_timeout_secs,
            skip_signature_verification,
            frontend_url,
            smtp: SmtpConfig::from_env(),
            app_version,
        })
    }

    // Helper cek production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

// Inisialisasi database connection pool
pub async fn init_db_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Initializing Payment Service database connection...");

    // Parse connection options dan disable prepared statements
    let options = PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(3)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect_with(options)
        .await?;

    tracing::info!("Payment Service database pool initialized");
    Ok(pool)
}

// Health check database connection
pub async fn check_db_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_optional(pool).await.is_ok()
}

// Application state yang di-share ke semua handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: AppConfig,
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
    pub refund_store: Arc<dyn RefundStore>,
    pub audit: Arc<dyn AuditStore>,
    pub intents: Arc<PaymentIntentManager>,
    pub reconciler: Arc<StatusReconciler>,
    pub refunds: Arc<RefundProcessor>,
}

impl axum::extract::FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl axum::extract::FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl AppState {
    // Inisialisasi application state: pool, gateway, stores, notification
    // worker, lalu komponen domain di atasnya
    pub async fn new(config: AppConfig) -> Result<Self, String> {
        let db = init_db_pool(&config.database_url)
            .await
            .map_err(|e| format!("Failed to init database: {}", e))?;

        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_url.clone(),
            config.stripe_timeout_secs,
        )?);

        let payments: Arc<dyn PaymentStore> = Arc::new(PaymentRepository::new(db.clone()));
        let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(db.clone()));
        let refund_store: Arc<dyn RefundStore> = Arc::new(RefundRepository::new(db.clone()));
        let audit: Arc<dyn AuditStore> = Arc::new(AuditRepository::new(db.clone()));

        let notifier = spawn_notification_worker(config.smtp.clone());

        let reconciler = Arc::new(StatusReconciler::new(
            payments.clone(),
            orders.clone(),
            audit.clone(),
            gateway.clone(),
            notifier,
        ));

        let intents = Arc::new(PaymentIntentManager::new(
            orders.clone(),
            payments.clone(),
            gateway.clone(),
            reconciler.clone(),
        ));

        let refunds = Arc::new(RefundProcessor::new(
            payments.clone(),
            refund_store.clone(),
            audit.clone(),
            gateway.clone(),
        ));

        Ok(AppState {
            db,
            config,
            payments,
            orders,
            refund_store,
            audit,
            intents,
            reconciler,
            refunds,
        })
    }

    // Inisialisasi application state dari environment
    pub async fn from_env() -> Result<Self, String> {
        let config = AppConfig::from_env()?;
        Self::new(config).await
    }

    // Health check semua dependencies
    pub async fn health_check(&self) -> HealthStatus {
        let db_healthy = check_db_health(&self.db).await;

        HealthStatus {
            database: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
            overall: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        }
    }
}

// Response untuk health check endpoint
#[derive(Debug, serde::Serialize)]
pub struct HealthStatus {
    pub database: String,
    pub overall: String,
}
