//! In-memory session cart. Lines live only as long as the process — the
//! checkout transaction is the durable record; the cart is scratch space a
//! guest fills in before that transaction exists. Keyed the same way the
//! notification test-send limiter keys its sliding window: an `Arc<Mutex<..>>`
//! behind a small struct, cloned cheaply into `AppState`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Clone)]
pub struct CartStore {
    carts: Arc<Mutex<HashMap<String, Vec<CartLine>>>>,
}

impl CartStore {
    pub fn new() -> Self {
        Self {
            carts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn key(tenant_id: Uuid, cart_id: &str) -> String {
        format!("{tenant_id}:{cart_id}")
    }

    /// `quantity <= 0` removes the line instead of storing a non-positive one.
    pub fn upsert(&self, tenant_id: Uuid, cart_id: &str, product_id: Uuid, quantity: i32) {
        let key = Self::key(tenant_id, cart_id);
        let mut carts = self.carts.lock();
        let lines = carts.entry(key).or_default();
        lines.retain(|line| line.product_id != product_id);
        if quantity > 0 {
            lines.push(CartLine { product_id, quantity });
        }
    }

    pub fn snapshot(&self, tenant_id: Uuid, cart_id: &str) -> Vec<CartLine> {
        let key = Self::key(tenant_id, cart_id);
        self.carts.lock().get(&key).cloned().unwrap_or_default()
    }

    pub fn clear(&self, tenant_id: Uuid, cart_id: &str) {
        let key = Self::key(tenant_id, cart_id);
        self.carts.lock().remove(&key);
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_existing_line_for_the_same_product() {
        let store = CartStore::new();
        let tenant = Uuid::new_v4();
        let product = Uuid::new_v4();
        store.upsert(tenant, "cart-1", product, 2);
        store.upsert(tenant, "cart-1", product, 5);
        let snapshot = store.snapshot(tenant, "cart-1");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].quantity, 5);
    }

    #[test]
    fn zero_quantity_removes_the_line() {
        let store = CartStore::new();
        let tenant = Uuid::new_v4();
        let product = Uuid::new_v4();
        store.upsert(tenant, "cart-1", product, 2);
        store.upsert(tenant, "cart-1", product, 0);
        assert!(store.snapshot(tenant, "cart-1").is_empty());
    }

    #[test]
    fn carts_are_isolated_per_tenant_and_cart_id() {
        let store = CartStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let product = Uuid::new_v4();
        store.upsert(tenant_a, "cart-1", product, 1);
        assert!(store.snapshot(tenant_b, "cart-1").is_empty());
        assert!(store.snapshot(tenant_a, "cart-2").is_empty());
    }
}
