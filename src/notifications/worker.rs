//! Notification worker (C9): consumes domain events from the broker and
//! turns them into rendered, delivered notifications with retry/backoff.

use crate::config::Config;
use crate::crypto::{CryptoEnvelope, LocalFileKms};
use crate::models::{DomainEvent, NotificationType};
use crate::notifications::mailer::NotificationMailer;
use crate::notifications::templates::{body_for, subject_for, Template};
use crate::repo::notifications::NotificationRepo;
use crate::repo::users::UserRepo;
use chrono::Utc;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::ClientConfig;
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct NotificationWorker {
    repo: NotificationRepo,
    mailer: NotificationMailer,
    users: UserRepo,
    crypto: CryptoEnvelope<LocalFileKms>,
    consumer: StreamConsumer,
}

impl NotificationWorker {
    pub fn new(
        config: &Config,
        repo: NotificationRepo,
        users: UserRepo,
        crypto: CryptoEnvelope<LocalFileKms>,
    ) -> anyhow::Result<Self> {
        let mailer = NotificationMailer::new(config)?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.broker_brokers)
            .set("group.id", "pos-notifier")
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "false")
            .create()?;
        consumer.subscribe(&[config.broker_topic.as_str()])?;

        Ok(Self {
            repo,
            mailer,
            users,
            crypto,
            consumer,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    if let Some(payload) = message.payload() {
                        if let Err(err) = self.handle_payload(payload).await {
                            error!(error = %err, "failed to handle notification event");
                        }
                    }
                    if let Err(err) = self.consumer.commit_message(&message, rdkafka::consumer::CommitMode::Async) {
                        warn!(error = %err, "failed to commit consumer offset");
                    }
                }
                Err(err) => {
                    warn!(error = %err, "notification consumer recv error");
                }
            }
        }
    }

    /// Recipient selection per event type: `order.invoice` targets the
    /// order's own customer email (carried plaintext in the event payload
    /// by the publisher); events naming a `user_id` target that user
    /// specifically; every other `order.*`/tenant-scoped event broadcasts
    /// to staff who've opted in.
    async fn resolve_recipients(&self, event: &DomainEvent) -> anyhow::Result<Vec<String>> {
        if event.event_type == "order.invoice" {
            return Ok(event
                .data
                .get("customer_email")
                .and_then(|v| v.as_str())
                .map(|e| vec![e.to_string()])
                .unwrap_or_default());
        }

        if let Some(user_id) = event.user_id {
            let Some(user) = self.users.find_by_id(event.tenant_id, user_id).await? else {
                return Ok(Vec::new());
            };
            let email = self.crypto.decrypt("user:email", &user.email_ciphertext).await?;
            return Ok(vec![email]);
        }

        let staff = self.users.find_opted_in(event.tenant_id).await?;
        let mut recipients = Vec::with_capacity(staff.len());
        for user in staff {
            match self.crypto.decrypt("user:email", &user.email_ciphertext).await {
                Ok(email) => recipients.push(email),
                Err(err) => warn!(error = %err, user_id = %user.id, "failed to decrypt staff email, skipping"),
            }
        }
        Ok(recipients)
    }

    async fn handle_payload(&self, payload: &[u8]) -> anyhow::Result<()> {
        let event: DomainEvent = serde_json::from_slice(payload)?;

        if self.repo.is_event_consumed(event.event_id).await? {
            info!(event_id = %event.event_id, "event already consumed, skipping");
            return Ok(());
        }

        // event_id doubles as the notification dedupe key: a second
        // delivery of the same event must not re-send even if the
        // `event_records` insert below somehow didn't stick.
        let transaction_id = event.event_id.to_string();
        if self
            .repo
            .find_sent_by_transaction(event.tenant_id, &transaction_id)
            .await?
            .is_some()
        {
            self.repo.mark_event_consumed(event.event_id, &event.event_type).await?;
            return Ok(());
        }

        let recipients = self.resolve_recipients(&event).await?;
        if recipients.is_empty() {
            info!(event_id = %event.event_id, event_type = %event.event_type, "no recipients resolved, skipping send");
            self.repo.mark_event_consumed(event.event_id, &event.event_type).await?;
            return Ok(());
        }

        let subject_template = Template::new(subject_for(&event.event_type));
        let body_template = Template::new(body_for(&event.event_type));
        let vars: HashMap<&str, String> = match &event.data {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                .collect(),
            _ => HashMap::new(),
        };

        let subject = subject_template.render(&vars);
        let body = body_template.render(&vars);

        for recipient in recipients {
            let recipient_ciphertext = self.crypto.encrypt("notification:recipient", &recipient).await?;
            let notification = self
                .repo
                .insert(
                    Uuid::new_v4(),
                    event.tenant_id,
                    NotificationType::Email,
                    &event.event_type,
                    &subject,
                    &body,
                    &recipient_ciphertext,
                    event.data.clone(),
                    Some(&transaction_id),
                    3,
                )
                .await?;

            let mailbox = match recipient.parse() {
                Ok(mailbox) => mailbox,
                Err(err) => {
                    self.repo.mark_failed(notification.id, Utc::now(), &err.to_string()).await?;
                    continue;
                }
            };

            match self.mailer.send_with_retry(mailbox, &subject, &body).await {
                Ok(()) => self.repo.mark_sent(notification.id, Utc::now()).await?,
                Err(err) => self.repo.mark_failed(notification.id, Utc::now(), &err.to_string()).await?,
            }
        }

        self.repo.mark_event_consumed(event.event_id, &event.event_type).await?;
        Ok(())
    }
}
