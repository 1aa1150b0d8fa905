// Refund Processor: validasi eligibility terhadap state lokal DAN gateway
// sebelum submit. Refund dicatat PENDING; rollup status parent payment ke
// REFUNDED/PARTIALLY_REFUNDED adalah pass reconciliation terpisah.

use crate::domain::audit::AuditAction;
use crate::domain::payment::PaymentStatus;
use crate::domain::refund::{NewRefund, Refund, RefundRequest, RefundStatus};
use crate::error::{AppError, AppResult};
use crate::handlers::stripe_gateway::{from_minor_units, to_minor_units, PaymentGateway};
use crate::repositories::audit_repo::AuditStore;
use crate::repositories::payment_repo::PaymentStore;
use crate::repositories::refund_repo::RefundStore;
use bigdecimal::BigDecimal;
use std::sync::Arc;

pub struct RefundProcessor {
    payments: Arc<dyn PaymentStore>,
    refunds: Arc<dyn RefundStore>,
    audit: Arc<dyn AuditStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl RefundProcessor {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        refunds: Arc<dyn RefundStore>,
        audit: Arc<dyn AuditStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            payments,
            refunds,
            audit,
            gateway,
        }
    }

    /// Proses refund admin. Urutan guard:
    /// 1. status lokal harus SUCCEEDED,
    /// 2. gateway harus lapor succeeded dengan captured amount > 0,
    /// 3. amount + refund non-failed sebelumnya <= captured amount.
    /// Baru setelah itu submit ke gateway dan persist row PENDING.
    pub async fn process_refund(&self, request: &RefundRequest) -> AppResult<Refund> {
        if request.amount <= BigDecimal::from(0) {
            return Err(AppError::validation("Refund amount must be greater than zero"));
        }

        let payment = self
            .payments
            .find_by_intent_id(&request.payment_intent_id)
            .await?
            .ok_or_else(|| {
                AppError::payment_not_found(format!(
                    "Payment intent {}",
                    request.payment_intent_id
                ))
            })?;

        if payment.status != PaymentStatus::Succeeded {
            return Err(AppError::invalid_refund_state(format!(
                "Payment must be succeeded to refund, current status is {}",
                payment.status
            )));
        }

        // Re-verify ke gateway: intent yang tidak pernah benar-benar
        // di-charge tidak boleh di-refund
        let intent = self
            .gateway
            .retrieve_intent(&request.payment_intent_id)
            .await?;

        if intent.status != "succeeded" || intent.amount_received <= 0 {
            return Err(AppError::payment_not_captured(format!(
                "Gateway reports status '{}' with {} captured",
                intent.status, intent.amount_received
            )));
        }

        let captured = from_minor_units(intent.amount_received);
        let already_refunded = self.refunds.total_refunded(payment.id).await?;

        if &request.amount + &already_refunded > captured {
            return Err(AppError::refund_exceeds_captured(format!(
                "Requested {} with {} already refunded exceeds captured amount {}",
                request.amount, already_refunded, captured
            )));
        }

        let amount_minor = to_minor_units(&request.amount)
            .ok_or_else(|| AppError::validation("Refund amount out of range"))?;

        let gateway_refund = self
            .gateway
            .create_refund(
                &request.payment_intent_id,
                amount_minor,
                request.reason.as_deref(),
            )
            .await?;

        tracing::info!(
            "Stripe menerima refund {} (status '{}') untuk payment {}",
            gateway_refund.id,
            gateway_refund.status,
            payment.id
        );

        let refund = self
            .refunds
            .insert(&NewRefund {
                payment_id: payment.id,
                stripe_refund_id: gateway_refund.id,
                amount: request.amount.clone(),
                reason: request.reason.clone(),
                status: RefundStatus::Pending,
            })
            .await?;

        let note = format!("{} {}", refund.amount, refund.stripe_refund_id);
        self.audit
            .append(payment.id, AuditAction::RefundInitiated, None, Some(note.as_str()))
            .await?;

        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Payment, PaymentMethodKind};
    use crate::handlers::stripe_gateway::{
        GatewayError, GatewayIntent, GatewayRefund, MockPaymentGateway,
    };
    use crate::repositories::audit_repo::MockAuditStore;
    use crate::repositories::payment_repo::MockPaymentStore;
    use crate::repositories::refund_repo::MockRefundStore;
    use chrono::Utc;
    use std::str::FromStr;

    fn payment(status: PaymentStatus) -> Payment {
        Payment {
            id: 1,
            order_id: 42,
            stripe_payment_intent_id: Some("pi_test_1".to_string()),
            stripe_charge_id: Some("ch_1".to_string()),
            amount: BigDecimal::from_str("49.99").unwrap(),
            currency: "usd".to_string(),
            payment_method: PaymentMethodKind::Card,
            status,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn captured_intent(amount_received: i64) -> GatewayIntent {
        GatewayIntent {
            id: "pi_test_1".to_string(),
            client_secret: None,
            status: "succeeded".to_string(),
            amount_received,
            latest_charge: Some("ch_1".to_string()),
            failure_message: None,
            metadata_order_id: Some(42),
        }
    }

    fn request(amount: &str) -> RefundRequest {
        RefundRequest {
            payment_intent_id: "pi_test_1".to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            reason: Some("customer request".to_string()),
        }
    }

    struct Harness {
        payments: MockPaymentStore,
        refunds: MockRefundStore,
        audit: MockAuditStore,
        gateway: MockPaymentGateway,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                payments: MockPaymentStore::new(),
                refunds: MockRefundStore::new(),
                audit: MockAuditStore::new(),
                gateway: MockPaymentGateway::new(),
            }
        }

        fn build(self) -> RefundProcessor {
            RefundProcessor::new(
                Arc::new(self.payments),
                Arc::new(self.refunds),
                Arc::new(self.audit),
                Arc::new(self.gateway),
            )
        }
    }

    #[tokio::test]
    async fn test_refund_rejected_when_payment_not_succeeded() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Failed,
            PaymentStatus::Canceled,
            PaymentStatus::Refunded,
        ] {
            let mut h = Harness::new();
            h.payments
                .expect_find_by_intent_id()
                .returning(move |_| Ok(Some(payment(status))));
            h.gateway.expect_retrieve_intent().times(0);
            h.gateway.expect_create_refund().times(0);

            let processor = h.build();
            let err = processor.process_refund(&request("10.00")).await.unwrap_err();
            assert!(
                matches!(err, AppError::InvalidRefundState(_)),
                "status {:?}",
                status
            );
        }
    }

    #[tokio::test]
    async fn test_refund_rejected_when_gateway_never_captured() {
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(PaymentStatus::Succeeded))));
        h.gateway.expect_retrieve_intent().returning(|_| {
            let mut intent = captured_intent(0);
            intent.status = "requires_capture".to_string();
            Ok(intent)
        });
        h.gateway.expect_create_refund().times(0);

        let processor = h.build();
        let err = processor.process_refund(&request("10.00")).await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotCaptured(_)));
    }

    #[tokio::test]
    async fn test_refund_rejected_one_cent_over_captured() {
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(PaymentStatus::Succeeded))));
        h.gateway
            .expect_retrieve_intent()
            .returning(|_| Ok(captured_intent(4999)));
        h.refunds
            .expect_total_refunded()
            .returning(|_| Ok(BigDecimal::from(0)));
        h.gateway.expect_create_refund().times(0);

        let processor = h.build();
        let err = processor.process_refund(&request("50.00")).await.unwrap_err();
        assert!(matches!(err, AppError::RefundExceedsCaptured(_)));
    }

    #[tokio::test]
    async fn test_refund_bound_counts_previous_refunds() {
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(PaymentStatus::Succeeded))));
        h.gateway
            .expect_retrieve_intent()
            .returning(|_| Ok(captured_intent(4999)));
        h.refunds
            .expect_total_refunded()
            .returning(|_| Ok(BigDecimal::from_str("40.00").unwrap()));
        h.gateway.expect_create_refund().times(0);

        let processor = h.build();
        let err = processor.process_refund(&request("10.00")).await.unwrap_err();
        assert!(matches!(err, AppError::RefundExceedsCaptured(_)));
    }

    #[tokio::test]
    async fn test_refund_happy_path_persists_pending_row_and_audit() {
        // Skenario D: refund 20.00 terhadap captured 49.99
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(PaymentStatus::Succeeded))));
        h.gateway
            .expect_retrieve_intent()
            .returning(|_| Ok(captured_intent(4999)));
        h.refunds
            .expect_total_refunded()
            .returning(|_| Ok(BigDecimal::from(0)));
        h.gateway
            .expect_create_refund()
            .times(1)
            .withf(|intent_id, amount_minor, reason| {
                intent_id == "pi_test_1"
                    && *amount_minor == 2000
                    && *reason == Some("customer request")
            })
            .returning(|_, _, _| {
                Ok(GatewayRefund {
                    id: "re_1".to_string(),
                    status: "pending".to_string(),
                })
            });
        h.refunds
            .expect_insert()
            .times(1)
            .withf(|new_refund| {
                new_refund.status == RefundStatus::Pending
                    && new_refund.stripe_refund_id == "re_1"
                    && new_refund.amount == BigDecimal::from_str("20.00").unwrap()
            })
            .returning(|n| {
                Ok(Refund {
                    id: 1,
                    payment_id: n.payment_id,
                    stripe_refund_id: n.stripe_refund_id.clone(),
                    amount: n.amount.clone(),
                    reason: n.reason.clone(),
                    status: n.status,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });
        h.audit
            .expect_append()
            .times(1)
            .withf(|payment_id, action, _, _| {
                *payment_id == 1 && *action == AuditAction::RefundInitiated
            })
            .returning(|id, action, _, new_value| {
                Ok(crate::domain::audit::PaymentAuditLog {
                    id: 1,
                    payment_id: id,
                    action: action.as_str().to_string(),
                    old_value: None,
                    new_value: new_value.map(str::to_string),
                    created_at: Utc::now(),
                })
            });

        let processor = h.build();
        let refund = processor.process_refund(&request("20.00")).await.unwrap();
        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.stripe_refund_id, "re_1");
    }

    #[tokio::test]
    async fn test_refund_gateway_error_propagates_without_insert() {
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(PaymentStatus::Succeeded))));
        h.gateway
            .expect_retrieve_intent()
            .returning(|_| Err(GatewayError::Unavailable("timeout".to_string())));
        h.refunds.expect_insert().times(0);
        h.audit.expect_append().times(0);

        let processor = h.build();
        let err = processor.process_refund(&request("10.00")).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));
    }
}
