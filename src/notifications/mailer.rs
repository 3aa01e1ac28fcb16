//! Shared SMTP transport + retry/backoff, used by both the event-driven
//! worker and the ledger's manual resend/test-send paths so the two don't
//! carry their own copies of the same backoff logic.

use crate::config::{Config, Deadlines};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const BACKOFF_SCHEDULE: [Duration; 3] =
    [Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)];

/// Whether an SMTP failure is worth retrying. Connection resets and transient
/// 4xx greylisting are retryable; a permanently rejected recipient is not.
fn is_retryable(err: &lettre::transport::smtp::Error) -> bool {
    !err.is_permanent()
}

#[derive(Clone)]
pub struct NotificationMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl NotificationMailer {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = if config.smtp_user.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .timeout(Some(Deadlines::SMTP))
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
                .port(config.smtp_port)
                .credentials(Credentials::new(config.smtp_user.clone(), config.smtp_password.clone()))
                .timeout(Some(Deadlines::SMTP))
                .build()
        };

        Ok(Self {
            transport,
            from: config.smtp_from.parse()?,
        })
    }

    pub async fn send_with_retry(&self, to: Mailbox, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())?;

        let mut last_err = None;
        for (attempt, backoff) in std::iter::once(None)
            .chain(BACKOFF_SCHEDULE.into_iter().map(Some))
            .enumerate()
        {
            if let Some(delay) = backoff {
                sleep(delay).await;
            }
            match self.transport.send(email.clone()).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    let retryable = is_retryable(&err);
                    warn!(attempt, retryable, error = %err, "SMTP send failed");
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "notification delivery failed after retries: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_2_4_8_seconds() {
        assert_eq!(BACKOFF_SCHEDULE[0], Duration::from_secs(2));
        assert_eq!(BACKOFF_SCHEDULE[1], Duration::from_secs(4));
        assert_eq!(BACKOFF_SCHEDULE[2], Duration::from_secs(8));
    }
}
