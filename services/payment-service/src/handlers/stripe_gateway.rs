use crate::domain::payment::PaymentStatus;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

// Error gateway: Unavailable itu transient (caller boleh retry),
// Rejected itu terminal untuk request tersebut
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("unexpected gateway response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Unavailable(err.to_string())
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => crate::error::AppError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => crate::error::AppError::GatewayRejected(msg),
            GatewayError::Parse(msg) => crate::error::AppError::GatewayUnavailable(msg),
        }
    }
}

// Metadata opaque yang ditempel ke intent di sisi gateway
#[derive(Debug, Clone, Copy)]
pub struct IntentMetadata {
    pub order_id: i32,
    pub user_id: i32,
}

// Snapshot intent seperti dilaporkan gateway
#[derive(Debug, Clone)]
pub struct GatewayIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    pub amount_received: i64,
    pub latest_charge: Option<String>,
    pub failure_message: Option<String>,
    pub metadata_order_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    pub status: String,
}

// Interface gateway yang dikonsumsi core. Setiap call adalah network I/O
// dengan timeout bounded; tidak ada state lokal yang berubah saat call gagal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt_email: &str,
        metadata: IntentMetadata,
    ) -> Result<GatewayIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError>;

    async fn create_refund<'a>(
        &self,
        intent_id: &str,
        amount_minor: i64,
        reason: Option<&'a str>,
    ) -> Result<GatewayRefund, GatewayError>;
}

// Service untuk integrasi Stripe
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    api_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_url: String, timeout_secs: u64) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            secret_key,
            api_url,
        })
    }

    async fn parse_intent(&self, response: reqwest::Response) -> Result<GatewayIntent, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        let payload: StripeIntentPayload = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("Failed to parse intent payload: {}", e)))?;

        Ok(payload.into_intent())
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt_email: &str,
        metadata: IntentMetadata,
    ) -> Result<GatewayIntent, GatewayError> {
        let form = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.to_string()),
            ("receipt_email", receipt_email.to_string()),
            ("payment_method_types[]", "card".to_string()),
            ("metadata[order_id]", metadata.order_id.to_string()),
            ("metadata[user_id]", metadata.user_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_url))
            .basic_auth(&self.secret_key, Some(""))
            .form(&form)
            .send()
            .await?;

        self.parse_intent(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_url, intent_id))
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await?;

        self.parse_intent(response).await
    }

    async fn create_refund<'a>(
        &self,
        intent_id: &str,
        amount_minor: i64,
        reason: Option<&'a str>,
    ) -> Result<GatewayRefund, GatewayError> {
        let mut form = vec![
            ("payment_intent", intent_id.to_string()),
            ("amount", amount_minor.to_string()),
        ];
        if let Some(reason) = reason {
            form.push(("metadata[reason]", reason.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_url))
            .basic_auth(&self.secret_key, Some(""))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        let payload: StripeRefundPayload = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(format!("Failed to parse refund payload: {}", e)))?;

        Ok(GatewayRefund {
            id: payload.id,
            status: payload.status,
        })
    }
}

// 4xx = rejection dengan pesan dari Stripe, sisanya transient
async fn error_from_response(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> GatewayError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StripeErrorPayload>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status.is_client_error() {
        GatewayError::Rejected(message)
    } else {
        GatewayError::Unavailable(format!("Stripe API error ({}): {}", status, message))
    }
}

// Wire payloads Stripe

#[derive(Debug, Deserialize)]
struct StripeIntentPayload {
    id: String,
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    amount_received: i64,
    latest_charge: Option<String>,
    last_payment_error: Option<StripePaymentError>,
    #[serde(default)]
    metadata: std::collections::HashMap<String, String>,
}

impl StripeIntentPayload {
    fn into_intent(self) -> GatewayIntent {
        let metadata_order_id = self
            .metadata
            .get("order_id")
            .and_then(|v| v.parse::<i32>().ok());

        GatewayIntent {
            id: self.id,
            client_secret: self.client_secret,
            status: self.status,
            amount_received: self.amount_received,
            latest_charge: self.latest_charge,
            failure_message: self.last_payment_error.and_then(|e| e.message),
            metadata_order_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefundPayload {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorPayload {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    message: String,
}

/// Tabel mapping status gateway -> status lokal. Dipakai identik di confirm,
/// webhook, dan manual sync. Status tak dikenal TIDAK PERNAH jadi SUCCEEDED.
pub fn map_gateway_status(gateway_status: &str) -> PaymentStatus {
    match gateway_status {
        "succeeded" => PaymentStatus::Succeeded,
        "requires_payment_method" | "canceled" => PaymentStatus::Failed,
        "processing" | "requires_action" | "requires_confirmation" | "requires_capture" => {
            PaymentStatus::Pending
        }
        _ => PaymentStatus::Failed,
    }
}

/// Verify signature webhook (skema Stripe-Signature: `t=<ts>,v1=<hex>` dengan
/// HMAC-SHA256 atas `"<ts>.<payload>"`).
pub fn verify_signature(payload: &str, signature_header: &str, secret: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let (Some(timestamp), false) = (timestamp, candidates.is_empty()) else {
        return false;
    };

    let signed_payload = format!("{}.{}", timestamp, payload);
    for candidate in candidates {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return true;
        }
    }

    false
}

/// Konversi major unit (BigDecimal) ke minor unit gateway (integer cents),
/// floor toward zero. Hanya boundary ini yang boleh melakukan konversi.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::Down)
        .to_i64()
}

/// Konversi balik minor unit gateway ke major unit.
pub fn from_minor_units(amount_minor: i64) -> BigDecimal {
    BigDecimal::new(amount_minor.into(), 2)
}
