//! Product and category repository.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Category, Product};
use crate::repo::Page;

#[derive(Clone)]
pub struct ProductRepo {
    pool: PgPool,
}

impl ProductRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(&self, tenant_id: Uuid, page: Page) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            "SELECT * FROM products
             WHERE tenant_id = $1 AND archived_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_by_category(
        &self,
        tenant_id: Uuid,
        category_id: Uuid,
        page: Page,
    ) -> Result<Vec<Product>, sqlx::Error> {
        // Joins a tenant-scoped category so a product cannot be returned
        // under a category id that belongs to another tenant.
        sqlx::query_as::<_, Product>(
            "SELECT p.* FROM products p
             JOIN categories c ON c.id = p.category_id AND c.tenant_id = p.tenant_id
             WHERE p.tenant_id = $1 AND c.id = $2 AND p.archived_at IS NULL
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(tenant_id)
        .bind(category_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_categories(&self, tenant_id: Uuid) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE tenant_id = $1 ORDER BY display_order ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Server-computed stock adjustment. Returns the audit delta so the
    /// caller can write an `audit_events` row describing what changed and
    /// why, never trusting a client-supplied delta.
    pub async fn adjust_stock(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        delta: i64,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE products SET stock_quantity = stock_quantity + $3
             WHERE tenant_id = $1 AND id = $2
             RETURNING stock_quantity",
        )
        .bind(tenant_id)
        .bind(product_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}
