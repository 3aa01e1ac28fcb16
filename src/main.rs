//! `pos-api` — the public HTTP surface: guest cart/checkout/order-status
//! endpoints and the gateway webhook, plus `/health` and `/metrics`.

use anyhow::{Context, Result};
use pos_backend::config::Config;
use pos_backend::crypto::{CryptoEnvelope, LocalFileKms};
use pos_backend::events::EventPublisher;
use pos_backend::http::cart::CartStore;
use pos_backend::http::state::AppState;
use pos_backend::inventory::InventoryManager;
use pos_backend::order::OrderStateMachine;
use pos_backend::payment::{MidtransGatewayClient, PaymentOrchestrator};
use pos_backend::repo::orders::OrderRepo;
use pos_backend::repo::payments::PaymentRepo;
use pos_backend::repo::products::ProductRepo;
use pos_backend::repo::reservations::ReservationRepo;
use pos_backend::repo::tenants::TenantRepo;
use pos_backend::webhook::WebhookProcessor;
use pos_backend::{db, http};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;

    let tenants = TenantRepo::new(pool.clone());
    let products = ProductRepo::new(pool.clone());
    let orders = OrderRepo::new(pool.clone());
    let reservations = ReservationRepo::new(pool.clone());
    let payments = PaymentRepo::new(pool.clone());

    let order_state_machine = OrderStateMachine::new(orders.clone());
    let inventory = InventoryManager::new(reservations.clone(), order_state_machine.clone());
    let events = EventPublisher::new(&config.broker_brokers, config.broker_topic.clone())
        .context("failed to construct event publisher")?;

    let gateway_client: Arc<dyn pos_backend::payment::GatewayClient> =
        Arc::new(MidtransGatewayClient::new());
    let gateway = PaymentOrchestrator::new(
        gateway_client,
        payments.clone(),
        order_state_machine.clone(),
        inventory.clone(),
        config.midtrans_webhook_url.clone(),
    );

    let kms = match &config.encryption_key_path {
        Some(path) => {
            LocalFileKms::load_from_path(path).context("failed to load local encryption key")?
        }
        None => LocalFileKms::from_key(derive_key("pos-backend:encryption-key", &config.jwt_secret)),
    };
    let integrity_key = derive_key("pos-backend:integrity-key", &config.session_secret);
    let crypto = CryptoEnvelope::new(kms, integrity_key);

    let webhook_processor = WebhookProcessor::new(
        payments.clone(),
        order_state_machine.clone(),
        inventory.clone(),
        events.clone(),
        crypto.clone(),
    );

    let state = AppState {
        tenants,
        products,
        orders,
        order_state_machine,
        inventory: inventory.clone(),
        payments,
        gateway,
        events,
        webhook_processor,
        crypto,
        carts: CartStore::new(),
        gateway_base_sandbox: config.midtrans_base_sandbox.clone(),
        gateway_base_production: config.midtrans_base_production.clone(),
    };

    spawn_reservation_sweeper(inventory);

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let router = http::build_router(state, prometheus_handle);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "pos-api listening");
    axum::serve(listener, router.into_make_service()).await?;

    Ok(())
}

/// Background tick that releases reservations whose TTL has passed. Runs
/// independently of request traffic for the process lifetime.
fn spawn_reservation_sweeper(inventory: InventoryManager) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(err) = inventory.sweep_expired(200).await {
                tracing::warn!(error = ?err, "reservation sweep failed");
            }
        }
    });
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
