//! `pos-notifier` — consumes domain events from the broker and turns them
//! into delivered (or retried, or dead-lettered) notifications.

use anyhow::{Context, Result};
use pos_backend::config::Config;
use pos_backend::crypto::{CryptoEnvelope, LocalFileKms};
use pos_backend::notifications::NotificationWorker;
use pos_backend::repo::notifications::NotificationRepo;
use pos_backend::repo::users::UserRepo;
use pos_backend::db;
use sha2::{Digest, Sha256};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;

    let repo = NotificationRepo::new(pool.clone());
    let users = UserRepo::new(pool);

    let kms = match &config.encryption_key_path {
        Some(path) => {
            LocalFileKms::load_from_path(path).context("failed to load local encryption key")?
        }
        None => LocalFileKms::from_key(derive_key("pos-backend:encryption-key", &config.jwt_secret)),
    };
    let integrity_key = derive_key("pos-backend:integrity-key", &config.session_secret);
    let crypto = CryptoEnvelope::new(kms, integrity_key);

    let worker = NotificationWorker::new(&config, repo, users, crypto)
        .context("failed to start notification worker")?;

    info!("pos-notifier consuming from broker topic {}", config.broker_topic);
    worker.run().await?;

    Ok(())
}

fn derive_key(label: &str, secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}
