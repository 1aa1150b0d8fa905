// Notification queue untuk email payment success/failed.
// Kontrak core adalah "enqueue notification", bukan "kirim email inline":
// acknowledge gateway tidak boleh menunggu SMTP.

use bigdecimal::BigDecimal;
use lettre::{
    message::{header::ContentType, Message},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::env;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

// Satu pesan di queue; semua data sudah di-resolve saat enqueue supaya
// worker tidak perlu akses database
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    pub to: String,
    pub order_number: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub outcome: PaymentOutcome,
    pub failure_reason: Option<String>,
}

// Konfigurasi SMTP dari environment variables
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub email_from: String,
    pub email_from_name: String,
}

impl SmtpConfig {
    // None kalau SMTP tidak dikonfigurasi; worker jalan dalam log-only mode
    pub fn from_env() -> Option<Self> {
        let smtp_host = env::var("SMTP_HOST").ok()?;

        Some(SmtpConfig {
            smtp_host,
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),
            email_from_name: env::var("EMAIL_FROM_NAME")
                .unwrap_or_else(|_| "Harsh Commerce".to_string()),
        })
    }
}

// Sender handle yang di-share lewat AppState. Enqueue tidak pernah
// mem-propagate error ke request path; queue penuh hanya di-log.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<PaymentNotification>,
}

impl NotificationSender {
    pub fn enqueue(&self, notification: PaymentNotification) {
        if let Err(e) = self.tx.try_send(notification) {
            tracing::warn!("Notification queue full or closed, dropping email: {}", e);
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> (Self, mpsc::Receiver<PaymentNotification>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (NotificationSender { tx }, rx)
    }
}

// Spawn worker task yang men-drain queue dan mengirim email
pub fn spawn_notification_worker(config: Option<SmtpConfig>) -> NotificationSender {
    let (tx, mut rx) = mpsc::channel::<PaymentNotification>(QUEUE_CAPACITY);

    if config.is_none() {
        tracing::warn!("SMTP tidak dikonfigurasi, payment emails hanya di-log");
    }

    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let Some(config) = config.clone() else {
                tracing::info!(
                    "Email (log-only) ke {} untuk order {}: payment {:?}",
                    notification.to,
                    notification.order_number,
                    notification.outcome
                );
                continue;
            };

            // SmtpTransport lettre itu blocking; jangan jalankan di executor
            let result = tokio::task::spawn_blocking(move || {
                send_payment_email(&config, &notification)
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Gagal kirim payment email: {}", e),
                Err(e) => tracing::error!("Notification worker panicked: {}", e),
            }
        }

        tracing::info!("Notification queue closed, worker exiting");
    });

    NotificationSender { tx }
}

fn send_payment_email(
    config: &SmtpConfig,
    notification: &PaymentNotification,
) -> Result<(), String> {
    let (subject, body) = render_payment_email(notification);

    let message = Message::builder()
        .from(
            format!("{} <{}>", config.email_from_name, config.email_from)
                .parse()
                .map_err(|e| format!("Invalid from address: {}", e))?,
        )
        .to(notification
            .to
            .parse()
            .map_err(|e| format!("Invalid recipient address: {}", e))?)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(body)
        .map_err(|e| format!("Failed to build email: {}", e))?;

    let mailer = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|e| format!("SMTP relay error: {}", e))?
        .port(config.smtp_port)
        .credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ))
        .build();

    mailer
        .send(&message)
        .map(|_| ())
        .map_err(|e| format!("SMTP send error: {}", e))
}

fn render_payment_email(notification: &PaymentNotification) -> (String, String) {
    match notification.outcome {
        PaymentOutcome::Succeeded => (
            format!("Payment confirmed - Order {}", notification.order_number),
            format!(
                r#"<html><body>
                <h2>Payment Successful</h2>
                <p>Your payment of <strong>{} {}</strong> for order
                <strong>{}</strong> has been confirmed.</p>
                <p>Thank you for shopping with Harsh Commerce!</p>
                </body></html>"#,
                notification.amount, notification.currency, notification.order_number
            ),
        ),
        PaymentOutcome::Failed => (
            format!("Payment failed - Order {}", notification.order_number),
            format!(
                r#"<html><body>
                <h2>Payment Failed</h2>
                <p>Your payment of <strong>{} {}</strong> for order
                <strong>{}</strong> could not be processed.</p>
                <p>Reason: {}</p>
                <p>You can retry the payment from your order page.</p>
                </body></html>"#,
                notification.amount,
                notification.currency,
                notification.order_number,
                notification
                    .failure_reason
                    .as_deref()
                    .unwrap_or("Payment was declined")
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample(outcome: PaymentOutcome, reason: Option<&str>) -> PaymentNotification {
        PaymentNotification {
            to: "buyer@example.com".to_string(),
            order_number: "ORD-42".to_string(),
            amount: BigDecimal::from_str("49.99").unwrap(),
            currency: "USD".to_string(),
            outcome,
            failure_reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn test_render_succeeded_email() {
        let (subject, body) = render_payment_email(&sample(PaymentOutcome::Succeeded, None));
        assert!(subject.contains("ORD-42"));
        assert!(body.contains("49.99 USD"));
        assert!(body.contains("confirmed"));
    }

    #[test]
    fn test_render_failed_email_includes_reason() {
        let (subject, body) =
            render_payment_email(&sample(PaymentOutcome::Failed, Some("card_declined")));
        assert!(subject.contains("failed"));
        assert!(body.contains("card_declined"));
    }

    #[test]
    fn test_render_failed_email_default_reason() {
        let (_, body) = render_payment_email(&sample(PaymentOutcome::Failed, None));
        assert!(body.contains("Payment was declined"));
    }

    #[tokio::test]
    async fn test_enqueue_delivers_to_worker_channel() {
        let (sender, mut rx) = NotificationSender::for_tests();
        sender.enqueue(sample(PaymentOutcome::Succeeded, None));

        let received = rx.recv().await.expect("notification should arrive");
        assert_eq!(received.order_number, "ORD-42");
        assert_eq!(received.outcome, PaymentOutcome::Succeeded);
    }
}
