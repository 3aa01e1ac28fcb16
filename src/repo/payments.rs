//! Payment transaction repository.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::PaymentTransaction;

#[derive(Clone)]
pub struct PaymentRepo {
    pool: PgPool,
}

impl PaymentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_by_idempotency_key(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id)
        .bind(idempotency_key)
        .fetch_optional(&mut **tx)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        order_id: Uuid,
        gateway_order_id: &str,
        qr_code_url: Option<&str>,
        qr_string: Option<&str>,
        expiry_time: Option<DateTime<Utc>>,
    ) -> Result<PaymentTransaction, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(
            "INSERT INTO payment_transactions
                (id, tenant_id, order_id, gateway_order_id, qr_code_url, qr_string, expiry_time, signature_verified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, false)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(order_id)
        .bind(gateway_order_id)
        .bind(qr_code_url)
        .bind(qr_string)
        .bind(expiry_time)
        .fetch_one(&self.pool)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    #[allow(clippy::too_many_arguments)]
    pub async fn record_webhook_result(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        order_id: Uuid,
        gateway_txn_id: &str,
        transaction_status: &str,
        idempotency_key: &str,
        signature_verified: bool,
        raw_payload: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payment_transactions
             SET gateway_txn_id = $3, transaction_status = $4, idempotency_key = $5,
                 signature_verified = $6, raw_webhook_payload = $7
             WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .bind(gateway_txn_id)
        .bind(transaction_status)
        .bind(idempotency_key)
        .bind(signature_verified)
        .bind(raw_payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_by_order(
        &self,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<PaymentTransaction>, sqlx::Error> {
        sqlx::query_as::<_, PaymentTransaction>(
            "SELECT * FROM payment_transactions WHERE tenant_id = $1 AND order_id = $2",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }
}
