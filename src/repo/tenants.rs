//! Tenant + tenant-config repository.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Tenant, TenantConfig, TenantStatus};

#[derive(Clone)]
pub struct TenantRepo {
    pool: PgPool,
}

impl TenantRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Public guest endpoints resolve the tenant from a URL slug, so this
    /// must only ever return an active tenant — a suspended or deleted
    /// tenant's slug should behave as if it doesn't exist.
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1 AND status = $2")
            .bind(slug)
            .bind(TenantStatus::Active)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn config_for(&self, tenant_id: Uuid) -> Result<Option<TenantConfig>, sqlx::Error> {
        sqlx::query_as::<_, TenantConfig>("SELECT * FROM tenant_configs WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Increments storage usage for a tenant by a request-declared byte
    /// size. Bounded by the configured quota at the call site, not here.
    pub async fn add_storage_used(&self, tenant_id: Uuid, bytes: i64) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE tenants SET storage_used_bytes = storage_used_bytes + $2
             WHERE id = $1
             RETURNING storage_used_bytes",
        )
        .bind(tenant_id)
        .bind(bytes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
