//! Webhook Processor (C6)
//! Mission: turn a Midtrans notification into exactly one order-state
//! transition, verifying the signature before any state is touched and
//! deduping by `gateway_txn_id:transaction_status` so a redelivered webhook
//! never double-applies.

use crate::crypto::{CryptoEnvelope, LocalFileKms};
use crate::error::AppError;
use crate::events::EventPublisher;
use crate::inventory::InventoryManager;
use crate::models::{OrderStatus, PaymentTransaction};
use crate::order::OrderStateMachine;
use crate::repo::payments::PaymentRepo;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    pub transaction_id: String,
    #[serde(default)]
    pub fraud_status: String,
}

#[derive(Clone)]
pub struct WebhookProcessor {
    payments: PaymentRepo,
    orders: OrderStateMachine,
    inventory: InventoryManager,
    events: EventPublisher,
    crypto: CryptoEnvelope<LocalFileKms>,
}

impl WebhookProcessor {
    pub fn new(
        payments: PaymentRepo,
        orders: OrderStateMachine,
        inventory: InventoryManager,
        events: EventPublisher,
        crypto: CryptoEnvelope<LocalFileKms>,
    ) -> Self {
        Self {
            payments,
            orders,
            inventory,
            events,
            crypto,
        }
    }

    /// `HASH_SHA512(order_id + status_code + gross_amount + server_key)`,
    /// matching the gateway's documented signing formula. Used identically
    /// in sandbox and production.
    pub fn verify_signature(
        server_key: &str,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        let computed = hex::encode(hasher.finalize());
        computed.eq_ignore_ascii_case(signature_key)
    }

    /// Handles one webhook delivery end to end: verify, dedupe, map status,
    /// transition order state, commit, then publish the resulting domain
    /// event strictly after the commit succeeds.
    pub async fn handle(
        &self,
        tenant_id: Uuid,
        server_key: &str,
        notification: &MidtransNotification,
    ) -> Result<(), AppError> {
        if !Self::verify_signature(
            server_key,
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
        ) {
            warn!(order_id = %notification.order_id, "webhook signature verification failed");
            return Err(AppError::Validation("invalid webhook signature".into()));
        }

        let idempotency_key = PaymentTransaction::idempotency_key_for(
            &notification.transaction_id,
            &notification.transaction_status,
        );

        let pool = self.payments.pool().clone();
        let mut tx = pool.begin().await?;

        if self
            .payments
            .find_by_idempotency_key(&mut tx, tenant_id, &idempotency_key)
            .await?
            .is_some()
        {
            info!(idempotency_key = %idempotency_key, "duplicate webhook delivery, skipping");
            tx.commit().await?;
            return Ok(());
        }

        let order = self
            .orders
            .find_order(tenant_id, &notification.order_id)
            .await?
            .ok_or(AppError::NotFound("order"))?;

        self.payments
            .record_webhook_result(
                &mut tx,
                tenant_id,
                order.id,
                &notification.transaction_id,
                &notification.transaction_status,
                &idempotency_key,
                true,
                serde_json::json!({
                    "order_id": notification.order_id,
                    "status_code": notification.status_code,
                    "gross_amount": notification.gross_amount,
                    "transaction_status": notification.transaction_status,
                    "fraud_status": notification.fraud_status,
                }),
            )
            .await?;

        let outcome = match notification.transaction_status.as_str() {
            "settlement" | "capture" if notification.fraud_status == "accept" => {
                self.orders
                    .transition_locked(&mut tx, tenant_id, order.id, OrderStatus::Paid)
                    .await?;
                self.inventory.convert(&mut tx, tenant_id, order.id).await?;
                Some("order.paid")
            }
            "deny" | "cancel" | "expire" | "failure" => {
                self.orders
                    .transition_locked(&mut tx, tenant_id, order.id, OrderStatus::Cancelled)
                    .await?;
                self.inventory.release(&mut tx, tenant_id, order.id).await?;
                Some("order.cancelled")
            }
            other => {
                info!(transaction_status = other, fraud_status = %notification.fraud_status, "webhook status does not require a transition");
                None
            }
        };

        tx.commit().await?;

        if let Some(event_type) = outcome {
            if let Err(err) = self
                .events
                .publish_order_event(tenant_id, &order.reference, event_type, order.id, serde_json::json!({}))
                .await
            {
                warn!(error = %err, order_id = %order.id, "failed to publish post-webhook event");
            }

            if event_type == "order.paid" {
                if let Some(ciphertext) = &order.customer_email_ciphertext {
                    match self.crypto.decrypt("guest_order:customer_email", ciphertext).await {
                        Ok(email) => {
                            if let Err(err) = self
                                .events
                                .publish_order_event(
                                    tenant_id,
                                    &order.reference,
                                    "order.invoice",
                                    order.id,
                                    serde_json::json!({ "customer_email": email }),
                                )
                                .await
                            {
                                warn!(error = %err, order_id = %order.id, "failed to publish invoice event");
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, order_id = %order.id, "failed to decrypt customer email for invoice event");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_documented_formula() {
        let order_id = "ORDER-1";
        let status_code = "200";
        let gross_amount = "50000.00";
        let server_key = "SB-Mid-server-abc123";

        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        let expected = hex::encode(hasher.finalize());

        assert!(WebhookProcessor::verify_signature(
            server_key,
            order_id,
            status_code,
            gross_amount,
            &expected,
        ));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        assert!(!WebhookProcessor::verify_signature(
            "SB-Mid-server-abc123",
            "ORDER-1",
            "200",
            "50000.00",
            "not-the-real-signature",
        ));
    }

    #[test]
    fn idempotency_key_is_transaction_and_status_scoped() {
        let key_a = PaymentTransaction::idempotency_key_for("txn-1", "settlement");
        let key_b = PaymentTransaction::idempotency_key_for("txn-1", "expire");
        assert_ne!(key_a, key_b);
    }
}
