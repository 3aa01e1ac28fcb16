//! Audit event and deletion-notification repository, used by C11's
//! retention sweep and by any component recording an auditable action.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::AuditEvent;

#[derive(Clone)]
pub struct AuditRepo {
    pool: PgPool,
}

impl AuditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn record(
        &self,
        tenant_id: Uuid,
        actor_id: &str,
        action: &str,
        subject: &str,
        metadata: serde_json::Value,
    ) -> Result<AuditEvent, sqlx::Error> {
        sqlx::query_as::<_, AuditEvent>(
            "INSERT INTO audit_events (id, tenant_id, actor_id, action, subject, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(actor_id)
        .bind(action)
        .bind(subject)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
    }

    /// Soft-deleted users whose deletion crossed the warning threshold and
    /// haven't been notified yet — idempotent marker so concurrent replicas
    /// of `pos-retention` can't double-notify.
    pub async fn mark_warned_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_deletion_notifications (user_id, tenant_id)
             VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Hard-deletes a retention-eligible user: removes the user row and
    /// cascades `sessions`, `password_reset_tokens`, and `invitations` (the
    /// latter matched by the user's own `email_ciphertext`, since
    /// invitations carry no `user_id` column), then rewrites any
    /// `audit_events` naming them as actor to a stable but no-longer-PII
    /// identifier. All in the caller's transaction so a crash partway
    /// through never leaves an orphaned child row.
    pub async fn anonymize_user(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT email_ciphertext FROM users WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        let Some((email_ciphertext,)) = row else {
            return Ok(0);
        };

        sqlx::query("DELETE FROM password_reset_tokens WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE tenant_id = $1 AND user_id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM invitations WHERE tenant_id = $1 AND email_ciphertext = $2")
            .bind(tenant_id)
            .bind(&email_ciphertext)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        let actor_id = format!("deleted-user-{user_id}");
        let result = sqlx::query(
            "UPDATE audit_events SET actor_id = $3
             WHERE tenant_id = $1 AND actor_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id.to_string())
        .bind(actor_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
