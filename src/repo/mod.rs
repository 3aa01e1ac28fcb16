//! Repository Layer (C3)
//! Mission: the only place SQL lives. Every query here filters by
//! `tenant_id`, including in JOINs, so a caller cannot accidentally read
//! across tenants even if the session-variable defense in depth were absent.

pub mod audit;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reservations;
pub mod tenants;
pub mod users;

/// Stable pagination cursor shared by every list endpoint: ordered by
/// `created_at DESC, id DESC` so a page boundary never shifts between
/// requests even when new rows are inserted concurrently.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, 200),
            offset: offset.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(50, 0)
    }
}
