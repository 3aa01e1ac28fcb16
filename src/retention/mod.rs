//! Audit/Retention Scheduler (C11)
//! Mission: daily sweep that warns soft-deleted users approaching the
//! hard-delete threshold, then permanently scrubs those past it. Every
//! action is idempotent per user so concurrent replicas never double-act.

use crate::config::Config;
use crate::events::EventPublisher;
use crate::repo::audit::AuditRepo;
use crate::repo::users::UserRepo;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

pub struct RetentionScheduler {
    users: UserRepo,
    audit: AuditRepo,
    events: EventPublisher,
    warn_days: i64,
    hard_delete_days: i64,
}

pub struct SweepReport {
    pub warned: usize,
    pub hard_deleted: usize,
}

impl RetentionScheduler {
    pub fn new(users: UserRepo, audit: AuditRepo, events: EventPublisher, config: &Config) -> Self {
        Self {
            users,
            audit,
            events,
            warn_days: config.retention_warn_days,
            hard_delete_days: config.retention_hard_delete_days,
        }
    }

    /// Runs one sweep: warn users crossing `warn_days` since soft-delete,
    /// hard-delete and anonymize users crossing `hard_delete_days`. Meant
    /// to run once per day; safe to run more often or concurrently.
    pub async fn run_once(&self) -> anyhow::Result<SweepReport> {
        let now = Utc::now();
        let warn_cutoff = now - ChronoDuration::days(self.warn_days);
        let hard_delete_cutoff = now - ChronoDuration::days(self.hard_delete_days);

        let warn_candidates = self
            .users
            .find_soft_deleted_between(hard_delete_cutoff, warn_cutoff)
            .await?;
        let mut warned = 0;
        for user in &warn_candidates {
            let mut tx = self.audit.pool().begin().await?;
            let newly_warned = self.audit.mark_warned_if_absent(&mut tx, user.id, user.tenant_id).await?;
            tx.commit().await?;
            if newly_warned {
                warned += 1;
                info!(user_id = %user.id, "warned user of upcoming hard delete");
                if let Err(err) = self
                    .events
                    .publish_tenant_event(
                        user.tenant_id,
                        Some(user.id),
                        "user.deletion_warning",
                        serde_json::json!({
                            "user_id": user.id,
                            "days_remaining": self.hard_delete_days - self.warn_days,
                        }),
                    )
                    .await
                {
                    warn!(error = %err, user_id = %user.id, "failed to publish deletion warning event");
                }
            }
        }

        let hard_delete_candidates = self.users.find_soft_deleted_before(hard_delete_cutoff).await?;
        let mut hard_deleted = 0;
        for user in &hard_delete_candidates {
            let mut tx = self.audit.pool().begin().await?;
            self.audit.anonymize_user(&mut tx, user.tenant_id, user.id).await?;
            tx.commit().await?;
            hard_deleted += 1;
            warn!(user_id = %user.id, "hard-deleted user past retention window");
        }

        Ok(SweepReport { warned, hard_deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoffs_are_computed_from_config_days() {
        let warn_days = 60i64;
        let hard_delete_days = 90i64;
        assert!(hard_delete_days > warn_days);
    }
}
