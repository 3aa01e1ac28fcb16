//! Gateway client abstraction. The orchestrator depends on the trait, not on
//! Midtrans directly, so tests can swap in `MockGatewayClient`.

use crate::config::Deadlines;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::Duration;

/// Delay before each retry of a retryable (5xx/network) charge failure.
/// Three attempts total: the initial try plus these two backoffs.
const CHARGE_RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub gateway_order_id: String,
    pub qr_code_url: String,
    pub qr_string: String,
    pub expiry_time: Option<DateTime<Utc>>,
}

/// Distinguishes a charge the gateway actively refused (don't retry) from a
/// transport/availability failure (safe to retry with backoff).
#[derive(Debug)]
pub enum GatewayError {
    Rejected(String),
    Unavailable(String),
}

/// Credentials are per-tenant (each tenant owns its own sandbox/production
/// server key), so the client takes them per call rather than storing one
/// tenant's credentials for the process lifetime.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn create_charge(
        &self,
        base_url: &str,
        server_key: &str,
        order_id: &str,
        gross_amount: i64,
        notification_url: Option<&str>,
    ) -> Result<GatewayCharge, GatewayError>;
}

/// Midtrans QRIS charge API client.
pub struct MidtransGatewayClient {
    client: reqwest::Client,
}

impl MidtransGatewayClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Deadlines::GATEWAY)
            .build()
            .expect("reqwest client with a fixed timeout always builds");
        Self { client }
    }
}

impl Default for MidtransGatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct MidtransChargeResponse {
    status_code: String,
    status_message: Option<String>,
    actions: Option<Vec<MidtransAction>>,
    expiry_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MidtransAction {
    name: String,
    url: String,
}

impl MidtransGatewayClient {
    /// Single HTTP attempt. 5xx and transport failures are classified as
    /// `Unavailable` (retryable); any other non-2xx is a terminal `Rejected`.
    async fn attempt_charge(
        &self,
        base_url: &str,
        server_key: &str,
        order_id: &str,
        gross_amount: i64,
        notification_url: Option<&str>,
    ) -> Result<GatewayCharge, GatewayError> {
        let body = json!({
            "payment_type": "qris",
            "transaction_details": {
                "order_id": order_id,
                "gross_amount": gross_amount,
            },
        });

        let auth = STANDARD.encode(format!("{server_key}:"));

        let mut req = self
            .client
            .post(format!("{base_url}/v2/charge"))
            .header("Authorization", format!("Basic {auth}"))
            .header("Accept", "application/json");
        if let Some(url) = notification_url.filter(|u| !u.is_empty()) {
            req = req.header("X-Override-Notification", url);
        }

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("gateway returned status {status}")));
        }

        let parsed: MidtransChargeResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed gateway response: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::Rejected(
                parsed
                    .status_message
                    .unwrap_or_else(|| format!("gateway returned status {}", parsed.status_code)),
            ));
        }

        let qr_action = parsed
            .actions
            .unwrap_or_default()
            .into_iter()
            .find(|a| a.name == "generate-qr-code")
            .ok_or_else(|| GatewayError::Unavailable("gateway response missing QR action".into()))?;

        let expiry_time = parsed
            .expiry_time
            .and_then(|s| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok())
            .map(|naive| naive.and_utc());

        Ok(GatewayCharge {
            gateway_order_id: order_id.to_string(),
            qr_code_url: qr_action.url.clone(),
            qr_string: qr_action.url,
            expiry_time,
        })
    }
}

#[async_trait]
impl GatewayClient for MidtransGatewayClient {
    async fn create_charge(
        &self,
        base_url: &str,
        server_key: &str,
        order_id: &str,
        gross_amount: i64,
        notification_url: Option<&str>,
    ) -> Result<GatewayCharge, GatewayError> {
        let mut attempt = 0usize;
        loop {
            match self
                .attempt_charge(base_url, server_key, order_id, gross_amount, notification_url)
                .await
            {
                Ok(charge) => return Ok(charge),
                Err(GatewayError::Rejected(detail)) => return Err(GatewayError::Rejected(detail)),
                Err(err @ GatewayError::Unavailable(_)) => {
                    let Some(delay) = CHARGE_RETRY_BACKOFF.get(attempt) else {
                        return Err(err);
                    };
                    attempt += 1;
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }
}

/// In-memory charge client used by tests and local development without a
/// sandbox credential.
pub struct MockGatewayClient {
    pub should_reject: bool,
}

impl MockGatewayClient {
    pub fn accepting() -> Self {
        Self { should_reject: false }
    }

    pub fn rejecting() -> Self {
        Self { should_reject: true }
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn create_charge(
        &self,
        _base_url: &str,
        _server_key: &str,
        order_id: &str,
        _gross_amount: i64,
        _notification_url: Option<&str>,
    ) -> Result<GatewayCharge, GatewayError> {
        if self.should_reject {
            return Err(GatewayError::Rejected("mock gateway rejected charge".into()));
        }
        Ok(GatewayCharge {
            gateway_order_id: order_id.to_string(),
            qr_code_url: format!("https://mock.local/qr/{order_id}.png"),
            qr_string: format!("00020101{order_id}"),
            expiry_time: Some(Utc::now() + chrono::Duration::minutes(15)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gateway_accepts_by_default() {
        let gw = MockGatewayClient::accepting();
        let charge = gw
            .create_charge("https://mock.local", "server-key", "ORDER-1", 50_000, None)
            .await
            .unwrap();
        assert_eq!(charge.gateway_order_id, "ORDER-1");
        assert!(charge.qr_code_url.contains("ORDER-1"));
    }

    #[tokio::test]
    async fn mock_gateway_can_simulate_rejection() {
        let gw = MockGatewayClient::rejecting();
        let result = gw
            .create_charge("https://mock.local", "server-key", "ORDER-2", 50_000, None)
            .await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
    }
}
