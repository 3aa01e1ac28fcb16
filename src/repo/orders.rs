//! Order and order-item repository.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{DeliveryAddress, GuestOrder, OrderItem, OrderStatus};
use crate::repo::Page;

#[derive(Clone)]
pub struct OrderRepo {
    pool: PgPool,
}

impl OrderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference: &str,
    ) -> Result<Option<GuestOrder>, sqlx::Error> {
        sqlx::query_as::<_, GuestOrder>(
            "SELECT * FROM guest_orders WHERE tenant_id = $1 AND reference = $2",
        )
        .bind(tenant_id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<GuestOrder>, sqlx::Error> {
        sqlx::query_as::<_, GuestOrder>(
            "SELECT * FROM guest_orders WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_id_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<GuestOrder>, sqlx::Error> {
        sqlx::query_as::<_, GuestOrder>(
            "SELECT * FROM guest_orders WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn list(&self, tenant_id: Uuid, page: Page) -> Result<Vec<GuestOrder>, sqlx::Error> {
        sqlx::query_as::<_, GuestOrder>(
            "SELECT * FROM guest_orders
             WHERE tenant_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn items_for(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<OrderItem>, sqlx::Error> {
        sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delivery_address_for(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<DeliveryAddress>, sqlx::Error> {
        sqlx::query_as::<_, DeliveryAddress>(
            "SELECT * FROM delivery_addresses WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        timestamp_column: &str,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        // `timestamp_column` is never caller-controlled outside this crate —
        // the order state machine is the sole caller and only ever passes
        // one of a fixed set of literal column names.
        let stmt = format!(
            "UPDATE guest_orders SET status = $3, {timestamp_column} = $4 WHERE tenant_id = $1 AND id = $2"
        );
        sqlx::query(&stmt)
            .bind(tenant_id)
            .bind(order_id)
            .bind(status)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
