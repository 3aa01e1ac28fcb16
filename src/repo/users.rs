//! User, invitation, session and password-reset repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Invitation, PasswordResetToken, Session, User};

#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE tenant_id = $1 AND id = $2 AND deleted_at IS NULL",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Lookup by the deterministic email ciphertext — exact match only,
    /// which is the point of using convergent encryption for this field.
    pub async fn find_by_email_ciphertext(
        &self,
        tenant_id: Uuid,
        email_ciphertext: &[u8],
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE tenant_id = $1 AND email_ciphertext = $2 AND deleted_at IS NULL",
        )
        .bind(tenant_id)
        .bind(email_ciphertext)
        .fetch_optional(&self.pool)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        email_ciphertext: &[u8],
        first_name_ciphertext: &[u8],
        last_name_ciphertext: &[u8],
        password_hash: &str,
        role: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users
                (id, tenant_id, email_ciphertext, first_name_ciphertext, last_name_ciphertext,
                 password_hash, role, status, locale, email_verified, notification_opt_in)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', 'en', false, true)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(email_ciphertext)
        .bind(first_name_ciphertext)
        .bind(last_name_ciphertext)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn soft_delete(&self, tenant_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET status = 'deleted', deleted_at = $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Users soft-deleted at or before `cutoff`, with no lower bound. Used
    /// by the retention scheduler's hard-delete pass, which must catch
    /// every straggler past the threshold regardless of how long ago.
    pub async fn find_soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE status = 'deleted' AND deleted_at IS NOT NULL AND deleted_at <= $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    /// Users soft-deleted in `(hard_delete_cutoff, warn_cutoff]`. Used by the
    /// warn pass so a user already past the hard-delete threshold doesn't
    /// get re-warned every day until the hard-delete pass actually reaches
    /// them.
    pub async fn find_soft_deleted_between(
        &self,
        hard_delete_cutoff: DateTime<Utc>,
        warn_cutoff: DateTime<Utc>,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE status = 'deleted' AND deleted_at IS NOT NULL
               AND deleted_at <= $2 AND deleted_at > $1",
        )
        .bind(hard_delete_cutoff)
        .bind(warn_cutoff)
        .fetch_all(&self.pool)
        .await
    }

    /// Tenant staff who've opted into notifications. Target audience for
    /// staff-facing order alerts.
    pub async fn find_opted_in(&self, tenant_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE tenant_id = $1 AND deleted_at IS NULL AND notification_opt_in = true",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create_invitation(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        email_ciphertext: &[u8],
        token_ciphertext: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<Invitation, sqlx::Error> {
        sqlx::query_as::<_, Invitation>(
            "INSERT INTO invitations (id, tenant_id, email_ciphertext, token_ciphertext, status, expires_at)
             VALUES ($1, $2, $3, $4, 'pending', $5)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(email_ciphertext)
        .bind(token_ciphertext)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create_session(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        session_id_ciphertext: &[u8],
        ip_ciphertext: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, tenant_id, user_id, session_id_ciphertext, ip_ciphertext, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(session_id_ciphertext)
        .bind(ip_ciphertext)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create_password_reset_token(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        token_ciphertext: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetToken, sqlx::Error> {
        sqlx::query_as::<_, PasswordResetToken>(
            "INSERT INTO password_reset_tokens (id, tenant_id, user_id, token_ciphertext, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(token_ciphertext)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
    }
}
