//! Inventory reservation repository. Row locking for linearizable stock
//! decrements lives here; the state machine in `crate::inventory` is the
//! only caller.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{InventoryReservation, ReservationStatus};

#[derive(Clone)]
pub struct ReservationRepo {
    pool: PgPool,
}

impl ReservationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Locks the product row and returns stock still available to reserve:
    /// `stock_quantity` minus the quantity already held by other `active`
    /// reservations. `stock_quantity` itself is only ever touched by
    /// Convert, so this is the only place the reservation ledger is
    /// consulted for a fresh check.
    pub async fn lock_product_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT p.stock_quantity - COALESCE((
                SELECT SUM(r.quantity) FROM inventory_reservations r
                WHERE r.tenant_id = p.tenant_id AND r.product_id = p.id AND r.status = 'active'
             ), 0)
             FROM products p
             WHERE p.tenant_id = $1 AND p.id = $2
             FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.0)
    }

    pub async fn decrement_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE products SET stock_quantity = stock_quantity - $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(product_id)
        .bind(quantity as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        tenant_id: Uuid,
        order_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<InventoryReservation, sqlx::Error> {
        sqlx::query_as::<_, InventoryReservation>(
            "INSERT INTO inventory_reservations
                (id, tenant_id, order_id, product_id, quantity, status, expires_at)
             VALUES ($1, $2, $3, $4, $5, 'active', $6)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .bind(expires_at)
        .fetch_one(&mut **tx)
        .await
    }

    pub async fn find_active_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<InventoryReservation>, sqlx::Error> {
        sqlx::query_as::<_, InventoryReservation>(
            "SELECT * FROM inventory_reservations
             WHERE tenant_id = $1 AND order_id = $2 AND status = 'active'
             FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn mark_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reservation_id: Uuid,
        status: ReservationStatus,
        released_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE inventory_reservations SET status = $2, released_at = $3 WHERE id = $1",
        )
        .bind(reservation_id)
        .bind(status)
        .bind(released_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Active reservations whose TTL has passed. Used by the periodic sweep;
    /// locks each row so a concurrent convert cannot race the sweep.
    pub async fn find_expired_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InventoryReservation>, sqlx::Error> {
        sqlx::query_as::<_, InventoryReservation>(
            "SELECT * FROM inventory_reservations
             WHERE status = 'active' AND expires_at <= $1
             ORDER BY expires_at ASC
             LIMIT $2
             FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
    }
}
