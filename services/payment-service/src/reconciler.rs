// Status Reconciler: satu-satunya authority yang boleh mengubah status
// payment. Dipakai oleh confirm path, webhook path, dan manual sync supaya
// status order tidak pernah bisa diverge dari status payment.

use crate::domain::audit::AuditAction;
use crate::domain::order::{OrderPaymentStatus, OrderStatus};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::error::{AppError, AppResult};
use crate::handlers::stripe_gateway::{map_gateway_status, GatewayIntent, PaymentGateway};
use crate::repositories::audit_repo::AuditStore;
use crate::repositories::order_repo::OrderStore;
use crate::repositories::payment_repo::PaymentStore;
use crate::utils::notify::{NotificationSender, PaymentNotification, PaymentOutcome};
use std::sync::Arc;

// Batas retry saat guarded update kalah race dari writer lain
const MAX_TRANSITION_ATTEMPTS: usize = 3;

pub struct StatusReconciler {
    payments: Arc<dyn PaymentStore>,
    orders: Arc<dyn OrderStore>,
    audit: Arc<dyn AuditStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: NotificationSender,
}

impl StatusReconciler {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        orders: Arc<dyn OrderStore>,
        audit: Arc<dyn AuditStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            payments,
            orders,
            audit,
            gateway,
            notifier,
        }
    }

    /// Transisi status payment secara idempotent. Status sama = no-op tanpa
    /// audit row. Transisi di luar tabel = di-log dan diabaikan (webhook
    /// redelivery yang stale tetap di-ack, tidak di-retry gateway).
    /// Guarded UPDATE (WHERE status = old) melinearisasi writer konkuren;
    /// tidak ada lock yang dipegang melewati network call.
    pub async fn transition(
        &self,
        payment_id: i32,
        new_status: PaymentStatus,
        failure_reason: Option<&str>,
        action: AuditAction,
    ) -> AppResult<Payment> {
        for _attempt in 0..MAX_TRANSITION_ATTEMPTS {
            let payment = self
                .payments
                .find_by_id(payment_id)
                .await?
                .ok_or_else(|| AppError::payment_not_found(format!("Payment {}", payment_id)))?;

            // Idempotence: target sudah tercapai, tidak ada side effect lagi
            if payment.status == new_status {
                return Ok(payment);
            }

            if !payment.status.can_transition_to(new_status) {
                tracing::warn!(
                    "Transisi {} -> {} untuk payment {} tidak valid, diabaikan",
                    payment.status,
                    new_status,
                    payment.id
                );
                return Ok(payment);
            }

            let old_status = payment.status;
            let updated = self
                .payments
                .transition_guarded(payment.id, old_status, new_status, failure_reason)
                .await?;

            let Some(updated) = updated else {
                // Writer lain menang; re-read dan evaluasi ulang
                tracing::debug!(
                    "Transisi konkuren pada payment {}, membaca ulang status",
                    payment.id
                );
                continue;
            };

            self.audit
                .append(
                    updated.id,
                    action,
                    Some(old_status.as_str()),
                    Some(new_status.as_str()),
                )
                .await?;

            tracing::info!(
                "Payment {} bertransisi {} -> {} ({})",
                updated.id,
                old_status,
                new_status,
                action
            );

            if matches!(new_status, PaymentStatus::Succeeded | PaymentStatus::Failed) {
                self.apply_order_outcome(&updated).await?;
            }

            return Ok(updated);
        }

        Err(AppError::internal(format!(
            "Payment {} terus konflik dengan writer lain",
            payment_id
        )))
    }

    /// Terapkan snapshot gateway ke payment: simpan charge id, map status
    /// lewat tabel translasi, lalu `transition`. Jalur confirm, webhook,
    /// dan sync semuanya berakhir di sini.
    pub async fn apply_gateway_snapshot(
        &self,
        payment: &Payment,
        intent: &GatewayIntent,
        action: AuditAction,
    ) -> AppResult<Payment> {
        if let Some(charge_id) = &intent.latest_charge {
            self.payments.set_charge_id(payment.id, charge_id).await?;
        }

        let mapped = map_gateway_status(&intent.status);
        let failure_reason = match mapped {
            PaymentStatus::Failed => Some(
                intent
                    .failure_message
                    .as_deref()
                    .unwrap_or("Payment was not completed"),
            ),
            _ => None,
        };

        self.transition(payment.id, mapped, failure_reason, action)
            .await
    }

    /// Manual reconciliation: re-fetch status remote tanpa syarat lalu
    /// transisi. Dipakai admin saat delivery webhook dicurigai hilang.
    /// Error gateway tidak mengubah state lokal sama sekali.
    pub async fn sync_with_gateway(&self, intent_id: &str) -> AppResult<Payment> {
        let payment = self
            .payments
            .find_by_intent_id(intent_id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(format!("Payment intent {}", intent_id)))?;

        let intent = self.gateway.retrieve_intent(intent_id).await?;
        let mapped = map_gateway_status(&intent.status);

        // Log old dan new walau tidak berubah, untuk operability
        tracing::info!(
            "Sync payment {}: lokal {} | gateway '{}' -> {}",
            payment.id,
            payment.status,
            intent.status,
            mapped
        );

        self.apply_gateway_snapshot(&payment, &intent, AuditAction::StatusSync)
            .await
    }

    /// Reset payment FAILED kembali ke PENDING supaya user bisa coba bayar
    /// lagi. Bukan bagian tabel transisi; ini aksi operator eksplisit dengan
    /// audit action sendiri.
    pub async fn retry_failed_payment(&self, payment: &Payment) -> AppResult<Payment> {
        if payment.status != PaymentStatus::Failed {
            return Err(AppError::validation(format!(
                "Only failed payments can be retried, current status is {}",
                payment.status
            )));
        }

        let updated = self
            .payments
            .transition_guarded(payment.id, PaymentStatus::Failed, PaymentStatus::Pending, None)
            .await?
            .ok_or_else(|| {
                AppError::validation("Payment status changed concurrently, retry not applied")
            })?;

        self.audit
            .append(
                updated.id,
                AuditAction::RetryInitiated,
                Some(PaymentStatus::Failed.as_str()),
                Some(PaymentStatus::Pending.as_str()),
            )
            .await?;

        tracing::info!("Payment {} di-reset untuk retry", updated.id);
        Ok(updated)
    }

    // Satu-satunya tempat order status mengikuti payment status.
    // Email dikirim lewat queue, tidak pernah inline.
    async fn apply_order_outcome(&self, payment: &Payment) -> AppResult<()> {
        let (order_status, order_payment_status, outcome) = match payment.status {
            PaymentStatus::Succeeded => (
                OrderStatus::Confirmed,
                OrderPaymentStatus::Completed,
                PaymentOutcome::Succeeded,
            ),
            PaymentStatus::Failed => (
                OrderStatus::Cancelled,
                OrderPaymentStatus::Failed,
                PaymentOutcome::Failed,
            ),
            _ => return Ok(()),
        };

        self.orders
            .apply_payment_outcome(payment.order_id, order_status, order_payment_status)
            .await?;

        match self.orders.find_by_id(payment.order_id).await {
            Ok(Some(order)) => {
                self.notifier.enqueue(PaymentNotification {
                    to: order.customer_email,
                    order_number: order.order_number,
                    amount: payment.amount.clone(),
                    currency: payment.currency.clone(),
                    outcome,
                    failure_reason: payment.failure_reason.clone(),
                });
            }
            Ok(None) => {
                tracing::error!(
                    "Order {} hilang saat notifikasi payment {}",
                    payment.order_id,
                    payment.id
                );
            }
            Err(e) => {
                // Order status sudah ter-update; kegagalan notifikasi tidak
                // boleh membatalkan transisi
                tracing::error!("Gagal baca order untuk notifikasi: {}", e);
            }
        }

        Ok(())
    }
}
