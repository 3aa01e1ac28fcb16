//! Notification ledger repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Notification, NotificationConfig, NotificationStatus, NotificationType};
use crate::repo::Page;

#[derive(Clone)]
pub struct NotificationRepo {
    pool: PgPool,
}

impl NotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        notification_type: NotificationType,
        event_type: &str,
        subject: &str,
        body: &str,
        recipient_ciphertext: &[u8],
        metadata: serde_json::Value,
        transaction_id: Option<&str>,
        max_retries: i32,
    ) -> Result<Notification, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications
                (id, tenant_id, notification_type, status, event_type, subject, body,
                 recipient_ciphertext, metadata, transaction_id, max_retries)
             VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(notification_type)
        .bind(event_type)
        .bind(subject)
        .bind(body)
        .bind(recipient_ciphertext)
        .bind(metadata)
        .bind(transaction_id)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await
    }

    /// Dedupe guard for the worker: a `sent` notification already exists for
    /// this gateway transaction, so a redelivered event must not re-send.
    pub async fn find_sent_by_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE tenant_id = $1 AND transaction_id = $2 AND status = 'sent'",
        )
        .bind(tenant_id)
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Notification>(
                    "SELECT * FROM notifications
                     WHERE tenant_id = $1 AND status = $2
                     ORDER BY created_at DESC, id DESC
                     LIMIT $3 OFFSET $4",
                )
                .bind(tenant_id)
                .bind(status)
                .bind(page.limit)
                .bind(page.offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Notification>(
                    "SELECT * FROM notifications
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
        }
    }

    pub async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notifications SET status = 'sent', sent_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_retrying(&self, id: Uuid, retry_count: i32, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notifications SET status = 'retrying', retry_count = $2, error_message = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(retry_count)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notifications SET status = 'failed', failed_at = $2, error_message = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reopens a failed or cancelled notification for a manual resend,
    /// bumping `retry_count` so the max-retries ceiling still applies.
    pub async fn requeue_for_resend(&self, tenant_id: Uuid, id: Uuid) -> Result<Notification, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications
             SET status = 'queued', retry_count = retry_count + 1, error_message = NULL
             WHERE tenant_id = $1 AND id = $2 AND status IN ('failed', 'cancelled')
             RETURNING *",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn config_for(&self, tenant_id: Uuid) -> Result<Option<NotificationConfig>, sqlx::Error> {
        sqlx::query_as::<_, NotificationConfig>(
            "SELECT * FROM notification_configs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn is_event_consumed(&self, event_id: Uuid) -> Result<bool, sqlx::Error> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT event_id FROM event_records WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn mark_event_consumed(&self, event_id: Uuid, topic: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO event_records (event_id, topic) VALUES ($1, $2)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(topic)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
