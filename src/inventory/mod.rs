//! Inventory Reservation Manager (C4)
//! Mission: hold stock for a pending order without selling it twice, using
//! row-level locking for linearizable decrements and a TTL so an abandoned
//! cart eventually releases its hold back to the shelf.

use crate::error::AppError;
use crate::models::OrderStatus;
use crate::order::OrderStateMachine;
use crate::repo::reservations::ReservationRepo;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct InventoryManager {
    reservations: ReservationRepo,
    orders: OrderStateMachine,
}

impl InventoryManager {
    pub fn new(reservations: ReservationRepo, orders: OrderStateMachine) -> Self {
        Self { reservations, orders }
    }

    /// Locks the product row, checks remaining stock against quantity
    /// already held by other active reservations, and creates a new
    /// reservation if there's enough left. `stock_quantity` itself is left
    /// untouched here — it's only decremented at Convert time. Must run
    /// inside the caller's checkout transaction so the lock and the
    /// reservation insert are atomic with the rest of order creation.
    pub async fn reserve(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        ttl_minutes: i64,
    ) -> Result<Uuid, AppError> {
        let available = self
            .reservations
            .lock_product_row(tx, tenant_id, product_id)
            .await?;

        if available < quantity as i64 {
            return Err(AppError::OutOfStock(product_id.to_string()));
        }

        let id = Uuid::new_v4();
        let expires_at = Utc::now() + ChronoDuration::minutes(ttl_minutes);
        self.reservations
            .insert(tx, id, tenant_id, order_id, product_id, quantity, expires_at)
            .await?;

        Ok(id)
    }

    /// Converts every active reservation on an order into a permanent stock
    /// decrement. Only legal when the order transitions to PAID.
    pub async fn convert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), AppError> {
        let active = self
            .reservations
            .find_active_for_order(tx, tenant_id, order_id)
            .await?;
        for reservation in active {
            self.reservations
                .decrement_stock(tx, tenant_id, reservation.product_id, reservation.quantity)
                .await?;
            self.reservations
                .mark_status(tx, reservation.id, crate::models::ReservationStatus::Converted, None)
                .await?;
        }
        Ok(())
    }

    /// Releases every active reservation on an order. `stock_quantity` was
    /// never decremented at reserve time, so there's nothing to give back —
    /// only the reservation status changes. Called on cancellation and by
    /// the TTL sweep.
    pub async fn release(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), AppError> {
        let active = self
            .reservations
            .find_active_for_order(tx, tenant_id, order_id)
            .await?;
        for reservation in active {
            self.reservations
                .mark_status(
                    tx,
                    reservation.id,
                    crate::models::ReservationStatus::Released,
                    Some(Utc::now()),
                )
                .await?;
        }
        Ok(())
    }

    /// Periodic sweep: finds reservations whose TTL has passed, releases
    /// them, and — if the owning order is still PENDING — cancels it too.
    /// Run from a background task on an interval, each tick in its own
    /// transaction so a crash mid-sweep only loses that batch.
    pub async fn sweep_expired(&self, batch_size: i64) -> Result<usize, AppError> {
        let mut tx = self.reservations.pool().begin().await?;
        let expired = self
            .reservations
            .find_expired_for_update(&mut tx, Utc::now(), batch_size)
            .await?;

        let count = expired.len();
        let mut seen_orders = std::collections::HashSet::new();
        for reservation in &expired {
            self.reservations
                .mark_status(
                    &mut tx,
                    reservation.id,
                    crate::models::ReservationStatus::Expired,
                    Some(Utc::now()),
                )
                .await?;

            if seen_orders.insert(reservation.order_id) {
                match self
                    .orders
                    .transition_locked(&mut tx, reservation.tenant_id, reservation.order_id, OrderStatus::Cancelled)
                    .await
                {
                    Ok(()) => {}
                    Err(AppError::Conflict(_)) => {
                        // order already left PENDING (paid, completed, or
                        // already cancelled) by the time the sweep got to it
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        tx.commit().await?;

        if count > 0 {
            info!(count, "released expired inventory reservations");
        } else {
            debug!("sweep found no expired reservations");
        }
        Ok(count)
    }
}
