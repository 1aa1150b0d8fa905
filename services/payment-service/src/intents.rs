// Payment Intent Manager: membuat intent di gateway + payment row PENDING,
// dan mengkonfirmasi dengan re-query kebenaran dari gateway. Request konfirmasi
// dari client hanyalah hint; claim sukses dari client tidak pernah dipercaya.

use crate::domain::audit::AuditAction;
use crate::domain::payment::{
    CreatePaymentIntentRequest, NewPayment, Payment, PaymentIntentResponse, PaymentMethodKind,
};
use crate::error::{AppError, AppResult};
use crate::handlers::stripe_gateway::{to_minor_units, IntentMetadata, PaymentGateway};
use crate::reconciler::StatusReconciler;
use crate::repositories::order_repo::OrderStore;
use crate::repositories::payment_repo::PaymentStore;
use bigdecimal::BigDecimal;
use std::sync::Arc;

pub struct PaymentIntentManager {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<StatusReconciler>,
}

impl PaymentIntentManager {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<StatusReconciler>,
    ) -> Self {
        Self {
            orders,
            payments,
            gateway,
            reconciler,
        }
    }

    /// Buat intent di gateway dan persist payment row PENDING.
    /// `user_id` selalu parameter eksplisit, tidak pernah dibaca dari
    /// ambient state.
    pub async fn create_intent(
        &self,
        user_id: i32,
        request: &CreatePaymentIntentRequest,
    ) -> AppResult<PaymentIntentResponse> {
        validate_create_request(request)?;

        let order = self
            .orders
            .find_by_id(request.order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(format!("Order {}", request.order_id)))?;

        if order.user_id != user_id {
            return Err(AppError::forbidden("Order does not belong to this user"));
        }

        if self.payments.find_by_order_id(order.id).await?.is_some() {
            return Err(AppError::duplicate_payment(format!(
                "A payment already exists for order {}",
                order.id
            )));
        }

        let amount_minor = to_minor_units(&request.amount)
            .ok_or_else(|| AppError::validation("Amount out of range"))?;

        let currency = request.currency.to_lowercase();
        let intent = self
            .gateway
            .create_intent(
                amount_minor,
                &currency,
                &request.customer_email,
                IntentMetadata {
                    order_id: order.id,
                    user_id,
                },
            )
            .await?;

        let client_secret = intent.client_secret.clone().ok_or_else(|| {
            AppError::gateway_unavailable("Gateway did not return a client secret")
        })?;

        let payment = self
            .payments
            .insert(&NewPayment {
                order_id: order.id,
                stripe_payment_intent_id: intent.id.clone(),
                amount: request.amount.clone(),
                currency: currency.clone(),
                payment_method: PaymentMethodKind::Card,
            })
            .await?;

        tracing::info!(
            "Intent {} dibuat untuk order {} (payment {})",
            intent.id,
            order.id,
            payment.id
        );

        Ok(PaymentIntentResponse {
            client_secret,
            payment_intent_id: intent.id,
            amount: payment.amount,
            currency: payment.currency,
        })
    }

    /// Konfirmasi intent: WAJIB re-query status dari gateway lalu serahkan
    /// hasil mapping ke reconciler. Endpoint ini tidak menerima status dari
    /// client sama sekali.
    pub async fn confirm_intent(&self, user_id: i32, intent_id: &str) -> AppResult<Payment> {
        let payment = self.find_owned_payment(user_id, intent_id).await?;

        let intent = self.gateway.retrieve_intent(intent_id).await?;

        self.reconciler
            .apply_gateway_snapshot(&payment, &intent, AuditAction::StatusUpdate)
            .await
    }

    /// Payment by intent id dengan ownership check; dipakai read endpoints
    /// dan retry.
    pub async fn find_owned_payment(&self, user_id: i32, intent_id: &str) -> AppResult<Payment> {
        let payment = self
            .payments
            .find_by_intent_id(intent_id)
            .await?
            .ok_or_else(|| AppError::payment_not_found(format!("Payment intent {}", intent_id)))?;

        let order = self
            .orders
            .find_by_id(payment.order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(format!("Order {}", payment.order_id)))?;

        if order.user_id != user_id {
            return Err(AppError::forbidden("Payment does not belong to this user"));
        }

        Ok(payment)
    }
}

fn validate_create_request(request: &CreatePaymentIntentRequest) -> AppResult<()> {
    if request.amount <= BigDecimal::from(0) {
        return Err(AppError::validation("Amount must be greater than zero"));
    }
    if request.currency.len() != 3 || !request.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("Currency must be a 3-letter ISO code"));
    }
    if !request.customer_email.contains('@') {
        return Err(AppError::validation("Invalid customer email"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderPaymentStatus, OrderStatus};
    use crate::domain::payment::PaymentStatus;
    use crate::handlers::stripe_gateway::{GatewayIntent, MockPaymentGateway};
    use crate::repositories::audit_repo::MockAuditStore;
    use crate::repositories::order_repo::MockOrderStore;
    use crate::repositories::payment_repo::MockPaymentStore;
    use crate::utils::notify::NotificationSender;
    use chrono::Utc;
    use std::str::FromStr;

    fn order(id: i32, user_id: i32) -> Order {
        Order {
            id,
            user_id,
            order_number: format!("ORD-{}", id),
            customer_email: "buyer@example.com".to_string(),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            total_amount: BigDecimal::from_str("49.99").unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn payment(id: i32, order_id: i32, status: PaymentStatus) -> Payment {
        Payment {
            id,
            order_id,
            stripe_payment_intent_id: Some(format!("pi_test_{}", id)),
            stripe_charge_id: None,
            amount: BigDecimal::from_str("49.99").unwrap(),
            currency: "usd".to_string(),
            payment_method: PaymentMethodKind::Card,
            status,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn gateway_intent(id: &str, status: &str) -> GatewayIntent {
        GatewayIntent {
            id: id.to_string(),
            client_secret: Some(format!("{}_secret_abc", id)),
            status: status.to_string(),
            amount_received: 0,
            latest_charge: None,
            failure_message: None,
            metadata_order_id: Some(42),
        }
    }

    fn request() -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            order_id: 42,
            amount: BigDecimal::from_str("49.99").unwrap(),
            currency: "USD".to_string(),
            customer_email: "buyer@example.com".to_string(),
        }
    }

    struct Harness {
        orders: MockOrderStore,
        payments: MockPaymentStore,
        gateway: MockPaymentGateway,
        // Store terpisah untuk reconciler internal supaya expectation
        // create/confirm tidak saling bercampur
        reconciler_payments: MockPaymentStore,
        reconciler_orders: MockOrderStore,
        audit: MockAuditStore,
        reconciler_gateway: MockPaymentGateway,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                orders: MockOrderStore::new(),
                payments: MockPaymentStore::new(),
                gateway: MockPaymentGateway::new(),
                reconciler_payments: MockPaymentStore::new(),
                reconciler_orders: MockOrderStore::new(),
                audit: MockAuditStore::new(),
                reconciler_gateway: MockPaymentGateway::new(),
            }
        }

        fn build(self) -> PaymentIntentManager {
            let (notifier, _rx) = NotificationSender::for_tests();
            let reconciler = Arc::new(StatusReconciler::new(
                Arc::new(self.reconciler_payments),
                Arc::new(self.reconciler_orders),
                Arc::new(self.audit),
                Arc::new(self.reconciler_gateway),
                notifier,
            ));
            PaymentIntentManager::new(
                Arc::new(self.orders),
                Arc::new(self.payments),
                Arc::new(self.gateway),
                reconciler,
            )
        }
    }

    #[tokio::test]
    async fn test_create_intent_happy_path_persists_pending_payment() {
        let mut h = Harness::new();
        h.orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));
        h.payments.expect_find_by_order_id().returning(|_| Ok(None));
        h.gateway
            .expect_create_intent()
            .times(1)
            .withf(|amount_minor, currency, email, metadata| {
                *amount_minor == 4999
                    && currency == "usd"
                    && email == "buyer@example.com"
                    && metadata.order_id == 42
                    && metadata.user_id == 7
            })
            .returning(|_, _, _, _| Ok(gateway_intent("pi_new", "requires_payment_method")));
        h.payments
            .expect_insert()
            .times(1)
            .withf(|new_payment| {
                new_payment.order_id == 42 && new_payment.stripe_payment_intent_id == "pi_new"
            })
            .returning(|n| {
                let mut p = payment(1, n.order_id, PaymentStatus::Pending);
                p.stripe_payment_intent_id = Some(n.stripe_payment_intent_id.clone());
                Ok(p)
            });

        let manager = h.build();
        let response = manager.create_intent(7, &request()).await.unwrap();

        assert_eq!(response.payment_intent_id, "pi_new");
        assert_eq!(response.client_secret, "pi_new_secret_abc");
    }

    #[tokio::test]
    async fn test_create_intent_unknown_order() {
        let mut h = Harness::new();
        h.orders.expect_find_by_id().returning(|_| Ok(None));

        let manager = h.build();
        let err = manager.create_intent(7, &request()).await.unwrap_err();
        assert!(matches!(err, AppError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_intent_rejects_cross_user_order() {
        let mut h = Harness::new();
        h.orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 99))));
        h.gateway.expect_create_intent().times(0);

        let manager = h.build();
        let err = manager.create_intent(7, &request()).await.unwrap_err();
        assert!(matches!(err, AppError::ForbiddenError(_)));
    }

    #[tokio::test]
    async fn test_create_intent_rejects_duplicate_payment() {
        let mut h = Harness::new();
        h.orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));
        h.payments
            .expect_find_by_order_id()
            .returning(|order_id| Ok(Some(payment(1, order_id, PaymentStatus::Pending))));
        h.gateway.expect_create_intent().times(0);

        let manager = h.build();
        let err = manager.create_intent(7, &request()).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicatePayment(_)));
    }

    #[tokio::test]
    async fn test_create_intent_validation() {
        let h = Harness::new();
        let manager = h.build();

        let mut bad_amount = request();
        bad_amount.amount = BigDecimal::from(0);
        assert!(matches!(
            manager.create_intent(7, &bad_amount).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let mut bad_currency = request();
        bad_currency.currency = "DOLLARS".to_string();
        assert!(matches!(
            manager.create_intent(7, &bad_currency).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let mut bad_email = request();
        bad_email.customer_email = "not-an-email".to_string();
        assert!(matches!(
            manager.create_intent(7, &bad_email).await.unwrap_err(),
            AppError::ValidationError(_)
        ));
    }

    #[tokio::test]
    async fn test_confirm_intent_requeries_gateway_and_succeeds() {
        // Skenario A: gateway lapor succeeded saat confirm
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(1, 42, PaymentStatus::Pending))));
        h.orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));
        h.gateway
            .expect_retrieve_intent()
            .times(1)
            .returning(|id| {
                let mut intent = gateway_intent(id, "succeeded");
                intent.amount_received = 4999;
                intent.latest_charge = Some("ch_1".to_string());
                Ok(intent)
            });
        h.reconciler_payments
            .expect_set_charge_id()
            .times(1)
            .returning(|_, _| Ok(()));
        h.reconciler_payments
            .expect_find_by_id()
            .returning(|id| Ok(Some(payment(id, 42, PaymentStatus::Pending))));
        h.reconciler_payments
            .expect_transition_guarded()
            .times(1)
            .withf(|_, _, to, _| *to == PaymentStatus::Succeeded)
            .returning(|id, _, to, _| Ok(Some(payment(id, 42, to))));
        h.audit.expect_append().times(1).returning(|id, action, _, _| {
            Ok(crate::domain::audit::PaymentAuditLog {
                id: 1,
                payment_id: id,
                action: action.as_str().to_string(),
                old_value: Some("pending".to_string()),
                new_value: Some("succeeded".to_string()),
                created_at: Utc::now(),
            })
        });
        h.reconciler_orders
            .expect_apply_payment_outcome()
            .times(1)
            .withf(|_, status, _| *status == OrderStatus::Confirmed)
            .returning(|_, _, _| Ok(()));
        h.reconciler_orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));

        let manager = h.build();
        let result = manager.confirm_intent(7, "pi_test_1").await.unwrap();
        assert_eq!(result.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_confirm_intent_maps_requires_payment_method_to_failed() {
        // Skenario B: gateway lapor requires_payment_method saat confirm
        let mut h = Harness::new();
        h.payments
            .expect_find_by_intent_id()
            .returning(|_| Ok(Some(payment(1, 42, PaymentStatus::Pending))));
        h.orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));
        h.gateway.expect_retrieve_intent().returning(|id| {
            let mut intent = gateway_intent(id, "requires_payment_method");
            intent.failure_message = Some("Your card was declined".to_string());
            Ok(intent)
        });
        h.reconciler_payments
            .expect_find_by_id()
            .returning(|id| Ok(Some(payment(id, 42, PaymentStatus::Pending))));
        h.reconciler_payments
            .expect_transition_guarded()
            .times(1)
            .withf(|_, _, to, reason| {
                *to == PaymentStatus::Failed && *reason == Some("Your card was declined")
            })
            .returning(|id, _, to, reason| {
                let mut p = payment(id, 42, to);
                p.failure_reason = reason.map(str::to_string);
                Ok(Some(p))
            });
        h.audit.expect_append().times(1).returning(|id, action, _, _| {
            Ok(crate::domain::audit::PaymentAuditLog {
                id: 1,
                payment_id: id,
                action: action.as_str().to_string(),
                old_value: None,
                new_value: None,
                created_at: Utc::now(),
            })
        });
        h.reconciler_orders
            .expect_apply_payment_outcome()
            .times(1)
            .withf(|_, status, payment_status| {
                *status == OrderStatus::Cancelled
                    && *payment_status == OrderPaymentStatus::Failed
            })
            .returning(|_, _, _| Ok(()));
        h.reconciler_orders
            .expect_find_by_id()
            .returning(|id| Ok(Some(order(id, 7))));

        let manager = h.build();
        let result = manager.confirm_intent(7, "pi_test_1").await.unwrap();
        assert_eq!(result.status, PaymentStatus::Failed);
        assert_eq!(result.failure_reason.as_deref(), Some("Your card was declined"));
    }

    #[tokio::test]
    async fn test_confirm_intent_unknown_payment() {
        let mut h = Harness::new();
        h.payments.expect_find_by_intent_id().returning(|_| Ok(None));

        let manager = h.build();
        let err = manager.confirm_intent(7, "pi_missing").await.unwrap_err();
        assert!(matches!(err, AppError::PaymentNotFound(_)));
    }
}
