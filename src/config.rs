//! Runtime configuration
//! Mission: Load every external dependency's address/credential from the
//! environment exactly once, so the rest of the crate never calls `env::var`.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Configuration shared by the API server, the notification worker, and the
/// retention scheduler. Each binary only reads the fields it needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_port: u16,

    pub jwt_secret: String,
    pub session_secret: String,

    pub kms_addr: Option<String>,
    pub kms_token: Option<String>,
    pub kms_transit_key: String,
    pub encryption_key_path: Option<String>,

    pub midtrans_base_sandbox: String,
    pub midtrans_base_production: String,
    pub midtrans_webhook_url: String,

    pub broker_brokers: String,
    pub broker_topic: String,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_from: String,

    pub reservation_ttl_minutes_default: i64,
    pub retention_warn_days: i64,
    pub retention_hard_delete_days: i64,

    pub rate_limit_test_send_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            http_port: env_parse("PORT", 8080),

            jwt_secret: env::var("JWT_SECRET")
                .context("JWT_SECRET must be set")?,
            session_secret: env::var("SESSION_SECRET")
                .unwrap_or_else(|_| "dev-session-secret-change-in-production".to_string()),

            kms_addr: env::var("KMS_ADDR").ok(),
            kms_token: env::var("KMS_TOKEN").ok(),
            kms_transit_key: env::var("KMS_TRANSIT_KEY")
                .unwrap_or_else(|_| "pos-pii".to_string()),
            encryption_key_path: env::var("ENCRYPTION_KEY_PATH").ok(),

            midtrans_base_sandbox: env::var("MIDTRANS_BASE_SANDBOX")
                .unwrap_or_else(|_| "https://api.sandbox.midtrans.com".to_string()),
            midtrans_base_production: env::var("MIDTRANS_BASE_PRODUCTION")
                .unwrap_or_else(|_| "https://api.midtrans.com".to_string()),
            midtrans_webhook_url: env::var("MIDTRANS_WEBHOOK_URL").unwrap_or_default(),

            broker_brokers: env::var("BROKER_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            broker_topic: env::var("BROKER_TOPIC")
                .unwrap_or_else(|_| "notification-events".to_string()),

            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env_parse("SMTP_PORT", 587),
            smtp_user: env::var("SMTP_USER").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "no-reply@example.com".to_string()),

            reservation_ttl_minutes_default: env_parse("RESERVATION_TTL_MINUTES_DEFAULT", 15),
            retention_warn_days: env_parse("RETENTION_WARN_DAYS", 60),
            retention_hard_delete_days: env_parse("RETENTION_HARD_DELETE_DAYS", 90),

            rate_limit_test_send_per_minute: env_parse("RATE_LIMIT_TEST_SEND_PER_MINUTE", 5),
        })
    }
}

/// Bounded deadlines per outbound collaborator, per the concurrency model (spec §5).
pub struct Deadlines;

impl Deadlines {
    pub const GATEWAY: Duration = Duration::from_secs(5);
    pub const KMS: Duration = Duration::from_secs(2);
    pub const SMTP: Duration = Duration::from_secs(10);
    pub const BROKER_SEND: Duration = Duration::from_secs(2);
    pub const DB_STATEMENT: Duration = Duration::from_secs(3);
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
