//! Payment Orchestrator (C5)
//! Mission: create a gateway charge for an order exactly once, and classify
//! gateway failures into retryable vs. terminal so callers know whether to
//! offer the customer a retry.

pub mod gateway;

pub use gateway::{GatewayClient, GatewayCharge, MidtransGatewayClient, MockGatewayClient};

use crate::error::AppError;
use crate::inventory::InventoryManager;
use crate::models::{GuestOrder, OrderStatus};
use crate::order::OrderStateMachine;
use crate::repo::payments::PaymentRepo;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentOrchestrator {
    gateway: Arc<dyn GatewayClient>,
    payments: PaymentRepo,
    orders: OrderStateMachine,
    inventory: InventoryManager,
    webhook_url: String,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        payments: PaymentRepo,
        orders: OrderStateMachine,
        inventory: InventoryManager,
        webhook_url: String,
    ) -> Self {
        Self {
            gateway,
            payments,
            orders,
            inventory,
            webhook_url,
        }
    }

    /// Idempotent by order id: if a payment transaction already exists for
    /// this order, returns it instead of calling the gateway again. On
    /// retry exhaustion (`PaymentGatewayUnavailable`), drives the order to
    /// CANCELLED and releases its reservations before propagating the
    /// error, so a dead gateway doesn't leave stock held indefinitely.
    pub async fn charge(
        &self,
        base_url: &str,
        server_key: &str,
        order: &GuestOrder,
    ) -> Result<GatewayCharge, AppError> {
        if let Some(existing) = self.payments.find_by_order(order.tenant_id, order.id).await? {
            if let (Some(qr_code_url), Some(qr_string)) =
                (existing.qr_code_url.clone(), existing.qr_string.clone())
            {
                return Ok(GatewayCharge {
                    gateway_order_id: existing.gateway_order_id,
                    qr_code_url,
                    qr_string,
                    expiry_time: existing.expiry_time,
                });
            }
        }

        let gateway_order_id = order.reference.clone();
        let notification_url = (!self.webhook_url.is_empty()).then_some(self.webhook_url.as_str());
        let charge = match self
            .gateway
            .create_charge(base_url, server_key, &gateway_order_id, order.total, notification_url)
            .await
        {
            Ok(charge) => charge,
            Err(gateway::GatewayError::Rejected(detail)) => return Err(AppError::PaymentRejected(detail)),
            Err(gateway::GatewayError::Unavailable(detail)) => {
                warn!(detail, order_id = %order.id, "gateway unavailable after retries, cancelling order");
                if let Err(err) = self.cancel_after_gateway_failure(order).await {
                    warn!(error = %err, order_id = %order.id, "failed to cancel order after gateway exhaustion");
                }
                return Err(AppError::PaymentGatewayUnavailable);
            }
        };

        self.payments
            .insert_pending(
                Uuid::new_v4(),
                order.tenant_id,
                order.id,
                &gateway_order_id,
                Some(&charge.qr_code_url),
                Some(&charge.qr_string),
                charge.expiry_time,
            )
            .await?;

        info!(order_id = %order.id, gateway_order_id = %gateway_order_id, "created gateway charge");
        Ok(charge)
    }

    async fn cancel_after_gateway_failure(&self, order: &GuestOrder) -> Result<(), AppError> {
        let mut tx = self.payments.pool().begin().await?;
        match self
            .orders
            .transition_locked(&mut tx, order.tenant_id, order.id, OrderStatus::Cancelled)
            .await
        {
            Ok(()) => {
                self.inventory.release(&mut tx, order.tenant_id, order.id).await?;
                tx.commit().await?;
                Ok(())
            }
            Err(AppError::Conflict(_)) => {
                tx.rollback().await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
