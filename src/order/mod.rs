//! Order State Machine (C7)
//! Mission: the sole writer of `guest_orders.status`. Enforces the legal
//! transition graph (`PENDING -> PAID -> COMPLETE`, `PENDING -> CANCELLED`)
//! and stamps the matching timestamp column on every transition.

use crate::error::AppError;
use crate::models::{GuestOrder, OrderStatus};
use crate::repo::orders::OrderRepo;
use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderStateMachine {
    orders: OrderRepo,
}

impl OrderStateMachine {
    pub fn new(orders: OrderRepo) -> Self {
        Self { orders }
    }

    pub async fn find_order(&self, tenant_id: Uuid, reference: &str) -> Result<Option<GuestOrder>, AppError> {
        Ok(self.orders.find_by_reference(tenant_id, reference).await?)
    }

    /// Validates the transition against the legal graph, then performs the
    /// update inside the caller's transaction. The caller is expected to
    /// have already locked the order row via `find_by_id_for_update` when
    /// the transition depends on the order's current state — as the
    /// webhook processor and checkout flow both do.
    pub async fn transition_locked(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
        to: OrderStatus,
    ) -> Result<(), AppError> {
        let order = self
            .orders
            .find_by_id_for_update(tx, tenant_id, order_id)
            .await?
            .ok_or(AppError::NotFound("order"))?;

        if !Self::is_legal(order.status, to) {
            return Err(AppError::Conflict(format!(
                "cannot transition order from {:?} to {:?}",
                order.status, to
            )));
        }

        let timestamp_column = match to {
            OrderStatus::Paid => "paid_at",
            OrderStatus::Complete => "completed_at",
            OrderStatus::Cancelled => "cancelled_at",
            OrderStatus::Pending => unreachable!("no transition targets PENDING"),
        };

        self.orders
            .update_status(tx, tenant_id, order_id, to, timestamp_column, Utc::now())
            .await?;
        Ok(())
    }

    fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Complete)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_move_to_paid_or_cancelled() {
        assert!(OrderStateMachine::is_legal(OrderStatus::Pending, OrderStatus::Paid));
        assert!(OrderStateMachine::is_legal(OrderStatus::Pending, OrderStatus::Cancelled));
    }

    #[test]
    fn paid_can_only_move_to_complete() {
        assert!(OrderStateMachine::is_legal(OrderStatus::Paid, OrderStatus::Complete));
        assert!(!OrderStateMachine::is_legal(OrderStatus::Paid, OrderStatus::Cancelled));
        assert!(!OrderStateMachine::is_legal(OrderStatus::Paid, OrderStatus::Pending));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for to in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Complete, OrderStatus::Cancelled] {
            assert!(!OrderStateMachine::is_legal(OrderStatus::Complete, to));
            assert!(!OrderStateMachine::is_legal(OrderStatus::Cancelled, to));
        }
    }
}
