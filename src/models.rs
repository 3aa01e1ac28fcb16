//! Data Model
//! Mission: typed representations of every tenant-scoped entity. Monetary
//! amounts are integers in the smallest currency unit throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Inactive,
    Active,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub display_name: String,
    pub slug: String,
    pub status: TenantStatus,
    pub storage_quota_bytes: i64,
    pub storage_used_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    Pickup,
    Delivery,
    DineIn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

/// Per-tenant settings. Delivery-fee/service-area specs are kept as opaque
/// JSON since their shape is discriminated and not load-bearing for the
/// ordering/payment/notification pipeline under test.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantConfig {
    pub tenant_id: Uuid,
    pub enabled_modes: Vec<String>,
    pub service_area: serde_json::Value,
    pub delivery_fee: serde_json::Value,
    pub reservation_ttl_minutes: i32,
    /// deterministically-encrypted gateway server key, context `tenant_config:gateway_server_key`
    pub gateway_server_key_ciphertext: Vec<u8>,
    pub gateway_environment: GatewayEnvironment,
    pub currency: String,
    pub minimum_order_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Manager,
    Cashier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Inactive,
    Active,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// deterministically-encrypted, context `user:email` — searchable by exact match
    pub email_ciphertext: Vec<u8>,
    pub first_name_ciphertext: Vec<u8>,
    pub last_name_ciphertext: Vec<u8>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub locale: String,
    pub email_verified: bool,
    pub notification_opt_in: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email_ciphertext: Vec<u8>,
    pub token_ciphertext: Vec<u8>,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub session_id_ciphertext: Vec<u8>,
    pub ip_ciphertext: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub token_ciphertext: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub sku: String,
    pub price: i64,
    pub cost: i64,
    pub tax_rate_bps: i32,
    pub stock_quantity: i64,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductPhoto {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub storage_key: String,
    pub display_order: i32,
    pub is_primary: bool,
    pub byte_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GuestOrder {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub reference: String,
    pub status: OrderStatus,
    pub fulfillment_mode: FulfillmentMode,
    pub customer_name_ciphertext: Vec<u8>,
    pub customer_phone_ciphertext: Vec<u8>,
    pub customer_email_ciphertext: Option<Vec<u8>>,
    pub customer_ip_ciphertext: Option<Vec<u8>>,
    pub customer_user_agent_ciphertext: Option<Vec<u8>>,
    pub table_number: Option<String>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub tax_total: i64,
    pub total: i64,
    pub notes: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub anonymized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name_snapshot: String,
    pub sku_snapshot: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub total_price: i64,
}

impl OrderItem {
    /// `total_price == quantity * unit_price`.
    pub fn is_consistent(&self) -> bool {
        self.total_price == self.unit_price * self.quantity as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryAddress {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub full_address_ciphertext: Vec<u8>,
    pub geocode_payload_ciphertext: Vec<u8>,
    pub latitude: f64,
    pub longitude: f64,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Expired,
    Converted,
    Released,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryReservation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_txn_id: Option<String>,
    pub transaction_status: Option<String>,
    pub idempotency_key: Option<String>,
    pub qr_code_url: Option<String>,
    pub qr_string: Option<String>,
    pub expiry_time: Option<DateTime<Utc>>,
    pub signature_verified: bool,
    pub raw_webhook_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn idempotency_key_for(gateway_txn_id: &str, status: &str) -> String {
        format!("{gateway_txn_id}:{status}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Push,
    InApp,
    Sms,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Sent,
    Failed,
    Retrying,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub notification_type: NotificationType,
    pub status: NotificationStatus,
    pub event_type: String,
    pub subject: String,
    pub body: String,
    pub recipient_ciphertext: Vec<u8>,
    pub metadata: serde_json::Value,
    pub transaction_id: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationConfig {
    pub tenant_id: Uuid,
    pub staff_order_alerts_enabled: bool,
    pub customer_invoices_enabled: bool,
    pub test_mode: bool,
    pub test_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub topic: String,
    pub consumed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_id: String,
    pub action: String,
    pub subject: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserDeletionNotification {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub notified_at: DateTime<Utc>,
}

/// JSON envelope carried on the broker topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_item_consistency_invariant() {
        let item = OrderItem {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name_snapshot: "Widget".into(),
            sku_snapshot: "W-1".into(),
            unit_price: 27_000,
            quantity: 2,
            total_price: 54_000,
        };
        assert!(item.is_consistent());

        let mut broken = item.clone();
        broken.total_price = 50_000;
        assert!(!broken.is_consistent());
    }

    #[test]
    fn idempotency_key_combines_txn_and_status() {
        assert_eq!(
            PaymentTransaction::idempotency_key_for("txn-1", "settlement"),
            "txn-1:settlement"
        );
    }
}
