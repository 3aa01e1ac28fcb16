//! Public, unauthenticated ordering endpoints: a guest builds a cart, checks
//! out into a `GuestOrder`, then polls for payment status by reference.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::state::AppState;
use crate::models::{FulfillmentMode, OrderStatus};
use crate::tenant::TenantContext;

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItemView>,
}

fn cart_id_from(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-cart-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("missing X-Cart-Id header".into()))
}

/// Adds or updates a single line in the caller's session cart. Stock is
/// checked here for early feedback only — the authoritative check, with a
/// row lock, happens again at checkout time.
pub async fn add_cart_item(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddCartItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if req.quantity < 0 {
        return Err(AppError::Validation("quantity must not be negative".into()));
    }
    let cart_id = cart_id_from(&headers)?;
    let tenant = state
        .tenants
        .find_by_slug(&tenant_slug)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;

    let product = state
        .products
        .find_by_id(tenant.id, req.product_id)
        .await?
        .ok_or(AppError::NotFound("product"))?;

    if req.quantity > 0 && product.stock_quantity < req.quantity as i64 {
        return Err(AppError::OutOfStock(product.id.to_string()));
    }

    state.carts.upsert(tenant.id, &cart_id, req.product_id, req.quantity);

    let items = state
        .carts
        .snapshot(tenant.id, &cart_id)
        .into_iter()
        .map(|line| CartItemView {
            product_id: line.product_id,
            quantity: line.quantity,
        })
        .collect();

    Ok(Json(CartResponse { items }))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutAddress {
    pub full_address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub fulfillment_mode: FulfillmentMode,
    pub address: Option<CheckoutAddress>,
    pub table_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_reference: String,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub payment_url: String,
    pub total: i64,
    pub expiry_time: Option<DateTime<Utc>>,
}

fn fulfillment_mode_code(mode: &FulfillmentMode) -> &'static str {
    match mode {
        FulfillmentMode::Pickup => "pickup",
        FulfillmentMode::Delivery => "delivery",
        FulfillmentMode::DineIn => "dine_in",
    }
}

fn generate_order_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("GO-{}", &id[..6])
}

/// Builds the order in one transaction — order row, item snapshots, and
/// every inventory reservation — then charges the gateway and publishes
/// `order.created` only after the transaction has committed.
pub async fn checkout(
    State(state): State<AppState>,
    Path(tenant_slug): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let cart_id = cart_id_from(&headers)?;
    let tenant = state
        .tenants
        .find_by_slug(&tenant_slug)
        .await?
        .ok_or(AppError::NotFound("tenant"))?;
    let config = state
        .tenants
        .config_for(tenant.id)
        .await?
        .ok_or(AppError::NotFound("tenant_config"))?;

    if !config
        .enabled_modes
        .iter()
        .any(|m| m == fulfillment_mode_code(&req.fulfillment_mode))
    {
        return Err(AppError::Validation(
            "fulfillment mode is not enabled for this tenant".into(),
        ));
    }

    match req.fulfillment_mode {
        FulfillmentMode::Delivery if req.address.is_none() => {
            return Err(AppError::Validation("address is required for delivery".into()));
        }
        FulfillmentMode::DineIn if req.table_number.is_none() => {
            return Err(AppError::Validation("table_number is required for dine-in".into()));
        }
        _ => {}
    }

    let cart_lines = state.carts.snapshot(tenant.id, &cart_id);
    if cart_lines.is_empty() {
        return Err(AppError::Validation("cart is empty".into()));
    }

    let mut subtotal: i64 = 0;
    let mut tax_total: i64 = 0;
    let mut line_items = Vec::with_capacity(cart_lines.len());
    for line in &cart_lines {
        let product = state
            .products
            .find_by_id(tenant.id, line.product_id)
            .await?
            .ok_or(AppError::NotFound("product"))?;
        let line_total = product.price * line.quantity as i64;
        let line_tax = line_total * product.tax_rate_bps as i64 / 10_000;
        subtotal += line_total;
        tax_total += line_tax;
        line_items.push((product, line.quantity, line_total));
    }

    let delivery_fee = if req.fulfillment_mode == FulfillmentMode::Delivery {
        config.delivery_fee.get("flat").and_then(|v| v.as_i64()).unwrap_or(0)
    } else {
        0
    };

    let total = subtotal + tax_total + delivery_fee;
    if total < config.minimum_order_amount {
        return Err(AppError::BelowMinimumOrder);
    }

    let order_id = Uuid::new_v4();
    let reference = generate_order_reference();

    let name_ciphertext = state
        .crypto
        .encrypt("guest_order:customer_name", &req.customer_name)
        .await?;
    let phone_ciphertext = state
        .crypto
        .encrypt("guest_order:customer_phone", &req.customer_phone)
        .await?;
    let email_ciphertext = match &req.customer_email {
        Some(email) => Some(state.crypto.encrypt("guest_order:customer_email", email).await?),
        None => None,
    };

    let pool = state.orders.pool().clone();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO guest_orders
            (id, tenant_id, reference, status, fulfillment_mode, customer_name_ciphertext,
             customer_phone_ciphertext, customer_email_ciphertext, table_number,
             subtotal, delivery_fee, tax_total, total, notes)
         VALUES ($1,$2,$3,'PENDING',$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
    )
    .bind(order_id)
    .bind(tenant.id)
    .bind(&reference)
    .bind(&req.fulfillment_mode)
    .bind(&name_ciphertext)
    .bind(&phone_ciphertext)
    .bind(&email_ciphertext)
    .bind(&req.table_number)
    .bind(subtotal)
    .bind(delivery_fee)
    .bind(tax_total)
    .bind(total)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;

    for (product, quantity, line_total) in &line_items {
        sqlx::query(
            "INSERT INTO order_items
                (id, tenant_id, order_id, product_id, name_snapshot, sku_snapshot, unit_price, quantity, total_price)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant.id)
        .bind(order_id)
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price)
        .bind(*quantity)
        .bind(*line_total)
        .execute(&mut *tx)
        .await?;

        state
            .inventory
            .reserve(
                &mut tx,
                tenant.id,
                order_id,
                product.id,
                *quantity,
                config.reservation_ttl_minutes as i64,
            )
            .await?;
    }

    if let Some(address) = &req.address {
        let full_address_ciphertext = state
            .crypto
            .encrypt("delivery_address:full_address", &address.full_address)
            .await?;
        let geocode_ciphertext = state
            .crypto
            .encrypt("delivery_address:geocode_payload", "{}")
            .await?;
        sqlx::query(
            "INSERT INTO delivery_addresses
                (id, tenant_id, order_id, full_address_ciphertext, geocode_payload_ciphertext, latitude, longitude)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant.id)
        .bind(order_id)
        .bind(&full_address_ciphertext)
        .bind(&geocode_ciphertext)
        .bind(address.latitude)
        .bind(address.longitude)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    state.carts.clear(tenant.id, &cart_id);

    let order = state
        .orders
        .find_by_id(tenant.id, order_id)
        .await?
        .ok_or(AppError::NotFound("order"))?;

    let server_key = state
        .crypto
        .decrypt(
            "tenant_config:gateway_server_key",
            &config.gateway_server_key_ciphertext,
        )
        .await?;
    let base_url = match config.gateway_environment {
        crate::models::GatewayEnvironment::Sandbox => state.gateway_base_sandbox.as_str(),
        crate::models::GatewayEnvironment::Production => state.gateway_base_production.as_str(),
    };

    let charge = state.gateway.charge(base_url, &server_key, &order).await?;

    if let Err(err) = state
        .events
        .publish_order_event(tenant.id, &reference, "order.created", order_id, serde_json::json!({}))
        .await
    {
        warn!(error = %err, order_id = %order_id, "failed to publish order.created event");
    }

    Ok(Json(CheckoutResponse {
        order_reference: reference,
        order_id,
        status: OrderStatus::Pending,
        payment_url: charge.qr_code_url,
        total,
        expiry_time: charge.expiry_time,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub reference: String,
    pub status: OrderStatus,
    pub fulfillment_mode: FulfillmentMode,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub tax_total: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub transaction_id: Option<String>,
    pub transaction_status: Option<String>,
    pub qr_code_url: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order: OrderView,
    pub payment: Option<PaymentView>,
}

/// Identifies the tenant from `X-Tenant-Id` since the reference alone is
/// only unique within a tenant, not globally.
pub async fn get_order(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(reference): Path<String>,
) -> Result<Json<OrderStatusResponse>, AppError> {
    let order = state
        .orders
        .find_by_reference(tenant.tenant_id, &reference)
        .await?
        .ok_or(AppError::NotFound("order"))?;

    let payment = state
        .payments
        .find_by_order(tenant.tenant_id, order.id)
        .await?
        .map(|p| PaymentView {
            transaction_id: p.gateway_txn_id,
            transaction_status: p.transaction_status,
            qr_code_url: p.qr_code_url,
            expiry_time: p.expiry_time,
        });

    Ok(Json(OrderStatusResponse {
        order: OrderView {
            reference: order.reference,
            status: order.status,
            fulfillment_mode: order.fulfillment_mode,
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            tax_total: order.tax_total,
            total: order.total,
        },
        payment,
    }))
}
