//! Shared application state, wired once in `main` and cloned cheaply per
//! request (everything inside wraps a `PgPool` or a broker handle, both
//! already cheap to clone).

use crate::crypto::{CryptoEnvelope, LocalFileKms};
use crate::events::EventPublisher;
use crate::http::cart::CartStore;
use crate::inventory::InventoryManager;
use crate::order::OrderStateMachine;
use crate::payment::PaymentOrchestrator;
use crate::repo::orders::OrderRepo;
use crate::repo::payments::PaymentRepo;
use crate::repo::products::ProductRepo;
use crate::repo::tenants::TenantRepo;
use crate::webhook::WebhookProcessor;

#[derive(Clone)]
pub struct AppState {
    pub tenants: TenantRepo,
    pub products: ProductRepo,
    pub orders: OrderRepo,
    pub order_state_machine: OrderStateMachine,
    pub inventory: InventoryManager,
    pub payments: PaymentRepo,
    pub gateway: PaymentOrchestrator,
    pub events: EventPublisher,
    pub webhook_processor: WebhookProcessor,
    pub crypto: CryptoEnvelope<LocalFileKms>,
    pub carts: CartStore,
    pub gateway_base_sandbox: String,
    pub gateway_base_production: String,
}
