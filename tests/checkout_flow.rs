//! End-to-end coverage of the checkout -> reservation -> webhook -> payment
//! pipeline against a real Postgres instance. Skipped (not failed) when
//! `TEST_DATABASE_URL` isn't set, so `cargo test` stays green in environments
//! with no database.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use pos_backend::crypto::{CryptoEnvelope, LocalFileKms};
use pos_backend::events::EventPublisher;
use pos_backend::http::cart::CartStore;
use pos_backend::http::public::{add_cart_item, checkout, get_order, AddCartItemRequest, CheckoutRequest};
use pos_backend::http::state::AppState;
use pos_backend::http::webhooks::midtrans_webhook;
use pos_backend::inventory::InventoryManager;
use pos_backend::models::{FulfillmentMode, OrderStatus};
use pos_backend::order::OrderStateMachine;
use pos_backend::payment::{MockGatewayClient, PaymentOrchestrator};
use pos_backend::repo::orders::OrderRepo;
use pos_backend::repo::payments::PaymentRepo;
use pos_backend::repo::products::ProductRepo;
use pos_backend::repo::reservations::ReservationRepo;
use pos_backend::repo::tenants::TenantRepo;
use pos_backend::tenant::TenantContext;
use pos_backend::webhook::{MidtransNotification, WebhookProcessor};
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP checkout_flow: TEST_DATABASE_URL not set");
            return None;
        }
    };
    let pool = match PgPool::connect(&url).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("SKIP checkout_flow: cannot connect to TEST_DATABASE_URL: {err}");
            return None;
        }
    };
    pos_backend::db::migrate(&pool).await.expect("migrate");
    Some(pool)
}

fn test_state(pool: PgPool, rejecting: bool) -> AppState {
    let tenants = TenantRepo::new(pool.clone());
    let products = ProductRepo::new(pool.clone());
    let orders = OrderRepo::new(pool.clone());
    let reservations = ReservationRepo::new(pool.clone());
    let payments = PaymentRepo::new(pool.clone());

    let order_state_machine = OrderStateMachine::new(orders.clone());
    let inventory = InventoryManager::new(reservations, order_state_machine.clone());
    let events = EventPublisher::new("localhost:9092", "test-events".to_string()).unwrap();

    let gateway_client: Arc<dyn pos_backend::payment::GatewayClient> = if rejecting {
        Arc::new(MockGatewayClient::rejecting())
    } else {
        Arc::new(MockGatewayClient::accepting())
    };
    let gateway = PaymentOrchestrator::new(
        gateway_client,
        payments.clone(),
        order_state_machine.clone(),
        inventory.clone(),
        "https://webhook.test.local/webhooks/midtrans".to_string(),
    );

    let crypto = CryptoEnvelope::new(LocalFileKms::from_key([11u8; 32]), [22u8; 32]);

    let webhook_processor = WebhookProcessor::new(
        payments.clone(),
        order_state_machine.clone(),
        inventory.clone(),
        events.clone(),
        crypto.clone(),
    );

    AppState {
        tenants,
        products,
        orders,
        order_state_machine,
        inventory,
        payments,
        gateway,
        events,
        webhook_processor,
        crypto,
        carts: CartStore::new(),
        gateway_base_sandbox: "https://mock.local".to_string(),
        gateway_base_production: "https://mock.local".to_string(),
    }
}

/// Seeds a tenant, its config, and one product with the given stock. Fixture
/// creation goes straight through SQL/the repository layer rather than an
/// admin HTTP endpoint, since none is in scope for this surface.
async fn seed_tenant_and_product(
    pool: &PgPool,
    state: &AppState,
    stock: i64,
    price: i64,
) -> (String, Uuid, String) {
    let tenant_id = Uuid::new_v4();
    let slug = format!("warung-{}", &tenant_id.simple().to_string()[..8]);
    sqlx::query("INSERT INTO tenants (id, display_name, slug) VALUES ($1, $2, $3)")
        .bind(tenant_id)
        .bind("Test Warung")
        .bind(&slug)
        .execute(pool)
        .await
        .unwrap();

    let server_key = "SB-Mid-server-test-key";
    let server_key_ciphertext = state
        .crypto
        .encrypt("tenant_config:gateway_server_key", server_key)
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO tenant_configs
            (tenant_id, enabled_modes, reservation_ttl_minutes, gateway_server_key_ciphertext,
             gateway_environment, minimum_order_amount)
         VALUES ($1, $2, 15, $3, 'sandbox', 0)",
    )
    .bind(tenant_id)
    .bind(vec!["pickup".to_string(), "delivery".to_string()])
    .bind(&server_key_ciphertext)
    .execute(pool)
    .await
    .unwrap();

    let product_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, tenant_id, name, sku, price, stock_quantity)
         VALUES ($1, $2, 'Fried Rice', 'SKU-1', $3, $4)",
    )
    .bind(product_id)
    .bind(tenant_id)
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await
    .unwrap();

    (slug, product_id, server_key.to_string())
}

fn headers_with_cart(cart_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-cart-id", cart_id.parse().unwrap());
    headers
}

#[tokio::test]
async fn checkout_reserves_stock_and_creates_a_pending_order() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), false);
    let (slug, product_id, _) = seed_tenant_and_product(&pool, &state, 10, 25_000).await;
    let cart_id = Uuid::new_v4().to_string();

    add_cart_item(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(AddCartItemRequest { product_id, quantity: 2 }),
    )
    .await
    .expect("add to cart");

    let response = checkout(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(CheckoutRequest {
            customer_name: "Alice".into(),
            customer_phone: "+6281234567890".into(),
            customer_email: None,
            fulfillment_mode: FulfillmentMode::Pickup,
            address: None,
            table_number: None,
            notes: None,
        }),
    )
    .await
    .expect("checkout");

    assert_eq!(response.status, OrderStatus::Pending);
    assert_eq!(response.total, 50_000);
    assert!(response.payment_url.contains(&response.order_reference));

    let remaining_stock: (i64,) = sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining_stock.0, 10, "reserving stock must not touch stock_quantity until convert");

    let reservation_count: (i64,) =
        sqlx::query_as("SELECT count(*) FROM inventory_reservations WHERE order_id = $1 AND status = 'active'")
            .bind(response.order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(reservation_count.0, 1);
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), false);
    let (slug, _product_id, _) = seed_tenant_and_product(&pool, &state, 10, 25_000).await;
    let cart_id = Uuid::new_v4().to_string();

    let result = checkout(
        State(state),
        Path(slug),
        headers_with_cart(&cart_id),
        Json(CheckoutRequest {
            customer_name: "Bob".into(),
            customer_phone: "+6281200000000".into(),
            customer_email: None,
            fulfillment_mode: FulfillmentMode::Pickup,
            address: None,
            table_number: None,
            notes: None,
        }),
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn checkout_rejects_when_requested_quantity_exceeds_stock() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), false);
    let (slug, product_id, _) = seed_tenant_and_product(&pool, &state, 1, 25_000).await;
    let cart_id = Uuid::new_v4().to_string();

    let result = add_cart_item(
        State(state),
        Path(slug),
        headers_with_cart(&cart_id),
        Json(AddCartItemRequest { product_id, quantity: 5 }),
    )
    .await;

    assert!(result.is_err());
}

/// Builds a webhook payload whose signature matches `WebhookProcessor`'s
/// documented formula, so the handler accepts it as authentic.
fn signed_notification(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str, transaction_status: &str) -> MidtransNotification {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    let signature_key = hex::encode(hasher.finalize());

    MidtransNotification {
        order_id: order_id.to_string(),
        status_code: status_code.to_string(),
        gross_amount: gross_amount.to_string(),
        signature_key,
        transaction_status: transaction_status.to_string(),
        transaction_id: format!("txn-{order_id}"),
        fraud_status: "accept".to_string(),
    }
}

#[tokio::test]
async fn settlement_webhook_marks_order_paid_and_converts_reservation() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), false);
    let (slug, product_id, server_key) = seed_tenant_and_product(&pool, &state, 5, 10_000).await;
    let cart_id = Uuid::new_v4().to_string();

    add_cart_item(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(AddCartItemRequest { product_id, quantity: 1 }),
    )
    .await
    .unwrap();

    let checkout_response = checkout(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(CheckoutRequest {
            customer_name: "Carla".into(),
            customer_phone: "+6281111111111".into(),
            customer_email: None,
            fulfillment_mode: FulfillmentMode::Pickup,
            address: None,
            table_number: None,
            notes: None,
        }),
    )
    .await
    .unwrap();

    let tenant = state.tenants.find_by_slug(&slug).await.unwrap().unwrap();
    let notification = signed_notification(
        &checkout_response.order_reference,
        "200",
        "10000.00",
        &server_key,
        "settlement",
    );

    let tenant_ctx = TenantContext { tenant_id: tenant.id };

    midtrans_webhook(State(state.clone()), tenant_ctx, Json(notification.clone()))
        .await
        .expect("webhook should succeed");

    let order = state
        .orders
        .find_by_reference(tenant.id, &checkout_response.order_reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let converted: (i64,) = sqlx::query_as(
        "SELECT count(*) FROM inventory_reservations WHERE order_id = $1 AND status = 'converted'",
    )
    .bind(order.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(converted.0, 1);

    // Redelivering the same webhook must not double-apply the transition.
    midtrans_webhook(State(state.clone()), tenant_ctx, Json(notification))
        .await
        .expect("duplicate webhook should be a no-op, not an error");

    let status_response = get_order(State(state.clone()), tenant_ctx, Path(checkout_response.order_reference))
        .await
        .unwrap();
    assert_eq!(status_response.order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), false);
    let (slug, product_id, _) = seed_tenant_and_product(&pool, &state, 5, 10_000).await;
    let cart_id = Uuid::new_v4().to_string();

    add_cart_item(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(AddCartItemRequest { product_id, quantity: 1 }),
    )
    .await
    .unwrap();

    let checkout_response = checkout(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(CheckoutRequest {
            customer_name: "Dimas".into(),
            customer_phone: "+6282222222222".into(),
            customer_email: None,
            fulfillment_mode: FulfillmentMode::Pickup,
            address: None,
            table_number: None,
            notes: None,
        }),
    )
    .await
    .unwrap();

    let tenant = state.tenants.find_by_slug(&slug).await.unwrap().unwrap();
    let mut notification = signed_notification(
        &checkout_response.order_reference,
        "200",
        "10000.00",
        "wrong-server-key",
        "settlement",
    );
    notification.signature_key = "deadbeef".repeat(16);

    let tenant_ctx = TenantContext { tenant_id: tenant.id };
    let result = midtrans_webhook(State(state), tenant_ctx, Json(notification)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn rejected_gateway_charge_surfaces_as_payment_rejected() {
    let Some(pool) = test_pool().await else { return };
    let state = test_state(pool.clone(), true);
    let (slug, product_id, _) = seed_tenant_and_product(&pool, &state, 5, 10_000).await;
    let cart_id = Uuid::new_v4().to_string();

    add_cart_item(
        State(state.clone()),
        Path(slug.clone()),
        headers_with_cart(&cart_id),
        Json(AddCartItemRequest { product_id, quantity: 1 }),
    )
    .await
    .unwrap();

    let result = checkout(
        State(state),
        Path(slug),
        headers_with_cart(&cart_id),
        Json(CheckoutRequest {
            customer_name: "Eka".into(),
            customer_phone: "+6283333333333".into(),
            customer_email: None,
            fulfillment_mode: FulfillmentMode::Pickup,
            address: None,
            table_number: None,
            notes: None,
        }),
    )
    .await;

    assert!(result.is_err());
}
