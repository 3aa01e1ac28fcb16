//! Connection pool + schema bootstrap.
//! Mission: one `PgPool` shared by every repo; an idempotent `migrate()` that
//! brings a fresh database up to the current schema, used by the API server
//! and by integration tests alike.

use crate::config::Deadlines;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let statement_timeout_ms = Deadlines::DB_STATEMENT.as_millis();
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Brings the schema up to date with `CREATE TABLE IF NOT EXISTS`. Every
/// entity in the data model gets a table here; there is no separate
/// migration history because the schema is additive-only for this crate's
/// lifetime.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY,
            display_name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'active',
            storage_quota_bytes BIGINT NOT NULL DEFAULT 5368709120,
            storage_used_bytes BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE TABLE IF NOT EXISTS tenant_configs (
            tenant_id UUID PRIMARY KEY REFERENCES tenants(id),
            enabled_modes TEXT[] NOT NULL DEFAULT '{}',
            service_area JSONB NOT NULL DEFAULT '{}',
            delivery_fee JSONB NOT NULL DEFAULT '{}',
            reservation_ttl_minutes INT NOT NULL DEFAULT 15,
            gateway_server_key_ciphertext BYTEA NOT NULL,
            gateway_environment TEXT NOT NULL DEFAULT 'sandbox',
            currency TEXT NOT NULL DEFAULT 'IDR',
            minimum_order_amount BIGINT NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            email_ciphertext BYTEA NOT NULL,
            first_name_ciphertext BYTEA NOT NULL,
            last_name_ciphertext BYTEA NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            locale TEXT NOT NULL DEFAULT 'en',
            email_verified BOOLEAN NOT NULL DEFAULT false,
            notification_opt_in BOOLEAN NOT NULL DEFAULT true,
            deleted_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_users_tenant ON users(tenant_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_tenant_email ON users(tenant_id, email_ciphertext);

        CREATE TABLE IF NOT EXISTS invitations (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            email_ciphertext BYTEA NOT NULL,
            token_ciphertext BYTEA NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_invitations_tenant ON invitations(tenant_id);

        CREATE TABLE IF NOT EXISTS sessions (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            user_id UUID NOT NULL REFERENCES users(id),
            session_id_ciphertext BYTEA NOT NULL,
            ip_ciphertext BYTEA NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            revoked_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_tenant_user ON sessions(tenant_id, user_id);

        CREATE TABLE IF NOT EXISTS password_reset_tokens (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            user_id UUID NOT NULL REFERENCES users(id),
            token_ciphertext BYTEA NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            used_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE TABLE IF NOT EXISTS categories (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            name TEXT NOT NULL,
            display_order INT NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_categories_tenant ON categories(tenant_id);

        CREATE TABLE IF NOT EXISTS products (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            category_id UUID REFERENCES categories(id),
            name TEXT NOT NULL,
            sku TEXT NOT NULL,
            price BIGINT NOT NULL,
            cost BIGINT NOT NULL DEFAULT 0,
            tax_rate_bps INT NOT NULL DEFAULT 0,
            stock_quantity BIGINT NOT NULL DEFAULT 0,
            archived_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_products_tenant ON products(tenant_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_products_tenant_sku ON products(tenant_id, sku);

        CREATE TABLE IF NOT EXISTS product_photos (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            product_id UUID NOT NULL REFERENCES products(id),
            storage_key TEXT NOT NULL,
            display_order INT NOT NULL DEFAULT 0,
            is_primary BOOLEAN NOT NULL DEFAULT false,
            byte_size BIGINT NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_product_photos_tenant_product ON product_photos(tenant_id, product_id);

        CREATE TABLE IF NOT EXISTS guest_orders (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            reference TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            fulfillment_mode TEXT NOT NULL,
            customer_name_ciphertext BYTEA NOT NULL,
            customer_phone_ciphertext BYTEA NOT NULL,
            customer_email_ciphertext BYTEA,
            customer_ip_ciphertext BYTEA,
            customer_user_agent_ciphertext BYTEA,
            table_number TEXT,
            subtotal BIGINT NOT NULL,
            delivery_fee BIGINT NOT NULL DEFAULT 0,
            tax_total BIGINT NOT NULL DEFAULT 0,
            total BIGINT NOT NULL,
            notes TEXT,
            paid_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            cancelled_at TIMESTAMPTZ,
            anonymized_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_guest_orders_tenant ON guest_orders(tenant_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_guest_orders_tenant_reference ON guest_orders(tenant_id, reference);
        CREATE INDEX IF NOT EXISTS idx_guest_orders_tenant_created ON guest_orders(tenant_id, created_at DESC, id DESC);

        CREATE TABLE IF NOT EXISTS order_items (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            order_id UUID NOT NULL REFERENCES guest_orders(id),
            product_id UUID NOT NULL REFERENCES products(id),
            name_snapshot TEXT NOT NULL,
            sku_snapshot TEXT NOT NULL,
            unit_price BIGINT NOT NULL,
            quantity INT NOT NULL,
            total_price BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_tenant_order ON order_items(tenant_id, order_id);

        CREATE TABLE IF NOT EXISTS delivery_addresses (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            order_id UUID NOT NULL REFERENCES guest_orders(id),
            full_address_ciphertext BYTEA NOT NULL,
            geocode_payload_ciphertext BYTEA NOT NULL,
            latitude DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL,
            zone TEXT
        );

        CREATE TABLE IF NOT EXISTS inventory_reservations (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            order_id UUID NOT NULL REFERENCES guest_orders(id),
            product_id UUID NOT NULL REFERENCES products(id),
            quantity INT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at TIMESTAMPTZ NOT NULL,
            released_at TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_reservations_tenant_product ON inventory_reservations(tenant_id, product_id);
        CREATE INDEX IF NOT EXISTS idx_reservations_status_expiry ON inventory_reservations(status, expires_at);

        CREATE TABLE IF NOT EXISTS payment_transactions (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            order_id UUID NOT NULL REFERENCES guest_orders(id),
            gateway_order_id TEXT NOT NULL,
            gateway_txn_id TEXT,
            transaction_status TEXT,
            idempotency_key TEXT,
            qr_code_url TEXT,
            qr_string TEXT,
            expiry_time TIMESTAMPTZ,
            signature_verified BOOLEAN NOT NULL DEFAULT false,
            raw_webhook_payload JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_payments_tenant_order ON payment_transactions(tenant_id, order_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_idempotency ON payment_transactions(idempotency_key)
            WHERE idempotency_key IS NOT NULL;

        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            notification_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            event_type TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            recipient_ciphertext BYTEA NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            transaction_id TEXT,
            retry_count INT NOT NULL DEFAULT 0,
            max_retries INT NOT NULL DEFAULT 3,
            sent_at TIMESTAMPTZ,
            failed_at TIMESTAMPTZ,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_tenant_created ON notifications(tenant_id, created_at DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_notifications_tenant_transaction ON notifications(tenant_id, transaction_id);

        CREATE TABLE IF NOT EXISTS notification_configs (
            tenant_id UUID PRIMARY KEY REFERENCES tenants(id),
            staff_order_alerts_enabled BOOLEAN NOT NULL DEFAULT true,
            customer_invoices_enabled BOOLEAN NOT NULL DEFAULT true,
            test_mode BOOLEAN NOT NULL DEFAULT false,
            test_email TEXT
        );

        CREATE TABLE IF NOT EXISTS event_records (
            event_id UUID PRIMARY KEY,
            topic TEXT NOT NULL,
            consumed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE TABLE IF NOT EXISTS audit_events (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            actor_id TEXT NOT NULL,
            action TEXT NOT NULL,
            subject TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant_created ON audit_events(tenant_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS user_deletion_notifications (
            user_id UUID NOT NULL,
            tenant_id UUID NOT NULL REFERENCES tenants(id),
            notified_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (user_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
