//! Notification ledger operations (C10): listing, manual resend, and a
//! rate-limited test-send path. The in-memory limiter mirrors the sliding
//! window the HTTP rate-limit middleware uses, keyed by user id instead of
//! IP since test-sends are an authenticated staff action.

use crate::config::Config;
use crate::crypto::{CryptoEnvelope, LocalFileKms};
use crate::error::AppError;
use crate::models::{Notification, NotificationStatus, NotificationType};
use crate::notifications::mailer::NotificationMailer;
use crate::repo::notifications::NotificationRepo;
use crate::repo::Page;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct NotificationLedger {
    repo: NotificationRepo,
    mailer: NotificationMailer,
    crypto: CryptoEnvelope<LocalFileKms>,
    test_send_limiter: TestSendLimiter,
}

impl NotificationLedger {
    pub fn new(
        repo: NotificationRepo,
        mailer: NotificationMailer,
        crypto: CryptoEnvelope<LocalFileKms>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            mailer,
            crypto,
            test_send_limiter: TestSendLimiter::new(config.rate_limit_test_send_per_minute),
        }
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> Result<Vec<Notification>, AppError> {
        Ok(self.repo.list(tenant_id, status, page).await?)
    }

    /// Only failed or cancelled notifications can be resent; rejects once
    /// `retry_count >= max_retries`. Re-enters the send path directly using
    /// the notification's stored rendered subject/body/recipient rather
    /// than just flipping status and leaving it for some other consumer.
    pub async fn resend(&self, tenant_id: Uuid, notification_id: Uuid) -> Result<Notification, AppError> {
        let existing = self
            .repo
            .find_by_id(tenant_id, notification_id)
            .await?
            .ok_or(AppError::NotFound("notification"))?;

        if existing.retry_count >= existing.max_retries {
            return Err(AppError::Conflict("notification has exhausted its retry budget".into()));
        }

        let requeued = self.repo.requeue_for_resend(tenant_id, notification_id).await?;
        let recipient = self
            .crypto
            .decrypt("notification:recipient", &requeued.recipient_ciphertext)
            .await?;
        let mailbox = recipient
            .parse()
            .map_err(|e| AppError::Validation(format!("invalid recipient address: {e}")))?;

        match self.mailer.send_with_retry(mailbox, &requeued.subject, &requeued.body).await {
            Ok(()) => self.repo.mark_sent(requeued.id, Utc::now()).await?,
            Err(err) => self.repo.mark_failed(requeued.id, Utc::now(), &err.to_string()).await?,
        }

        self.repo
            .find_by_id(tenant_id, requeued.id)
            .await?
            .ok_or(AppError::NotFound("notification"))
    }

    /// Sends a one-off test notification to a staff-supplied address,
    /// bypassing the normal ledger but still subject to the per-user rate
    /// limit so the SMTP relay can't be hammered through this path. When
    /// the tenant's `NotificationConfig.test_mode` is on, the send is
    /// redirected to the configured `test_email` instead of the supplied
    /// recipient.
    pub async fn test_send(
        &self,
        tenant_id: Uuid,
        actor_user_id: Uuid,
        recipient_ciphertext: Vec<u8>,
        subject: &str,
        body: &str,
    ) -> Result<Notification, AppError> {
        if !self.test_send_limiter.allow(actor_user_id) {
            return Err(AppError::Conflict("test-send rate limit exceeded, try again shortly".into()));
        }

        let recipient_email = self.crypto.decrypt("notification:recipient", &recipient_ciphertext).await?;

        let config = self.repo.config_for(tenant_id).await?;
        let target_email = match config.filter(|c| c.test_mode).and_then(|c| c.test_email) {
            Some(test_email) => test_email,
            None => recipient_email,
        };
        let target_ciphertext = self.crypto.encrypt("notification:recipient", &target_email).await?;

        let notification = self
            .repo
            .insert(
                Uuid::new_v4(),
                tenant_id,
                NotificationType::Email,
                "test_send",
                subject,
                body,
                &target_ciphertext,
                serde_json::json!({ "actor_user_id": actor_user_id }),
                None,
                1,
            )
            .await?;

        let mailbox = target_email
            .parse()
            .map_err(|e| AppError::Validation(format!("invalid recipient address: {e}")))?;

        match self.mailer.send_with_retry(mailbox, subject, body).await {
            Ok(()) => self.repo.mark_sent(notification.id, Utc::now()).await?,
            Err(err) => self.repo.mark_failed(notification.id, Utc::now(), &err.to_string()).await?,
        }

        self.repo
            .find_by_id(tenant_id, notification.id)
            .await?
            .ok_or(AppError::NotFound("notification"))
    }
}

struct TestSendLimiter {
    max_per_minute: u32,
    state: Arc<Mutex<HashMap<Uuid, Window>>>,
}

struct Window {
    count: u32,
    started_at: Instant,
}

impl TestSendLimiter {
    fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, user_id: Uuid) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = state.entry(user_id).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(window.started_at) >= Duration::from_secs(60) {
            window.count = 0;
            window.started_at = now;
        }

        window.count += 1;
        window.count <= self.max_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_configured_limit() {
        let limiter = TestSendLimiter::new(3);
        let user_id = Uuid::new_v4();
        assert!(limiter.allow(user_id));
        assert!(limiter.allow(user_id));
        assert!(limiter.allow(user_id));
        assert!(!limiter.allow(user_id));
    }

    #[test]
    fn limits_are_independent_per_user() {
        let limiter = TestSendLimiter::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(limiter.allow(a));
        assert!(limiter.allow(b));
        assert!(!limiter.allow(a));
    }
}
