//! Gateway webhook ingress. The tenant is identified from `X-Tenant-Id`
//! rather than the order payload, since the server key used to verify the
//! signature is per-tenant configuration.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::http::state::AppState;
use crate::tenant::TenantContext;
use crate::webhook::MidtransNotification;

pub async fn midtrans_webhook(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(notification): Json<MidtransNotification>,
) -> Result<Json<Value>, AppError> {
    let config = state
        .tenants
        .config_for(tenant.tenant_id)
        .await?
        .ok_or(AppError::NotFound("tenant_config"))?;
    let server_key = state
        .crypto
        .decrypt(
            "tenant_config:gateway_server_key",
            &config.gateway_server_key_ciphertext,
        )
        .await?;

    state
        .webhook_processor
        .handle(tenant.tenant_id, &server_key, &notification)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}
