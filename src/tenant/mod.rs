//! Tenant Context Propagator (C2)
//! Mission: every handler that touches tenant-scoped data receives an
//! explicit, validated `TenantContext` rather than reaching into a global.
//! The context also carries the `SET LOCAL app.tenant_id` discipline so row
//! security and query filtering stay aligned.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Resolved from the `:tenant` path segment (a slug) or an `X-Tenant-Id`
/// header, depending on the route. Carries only the tenant id once
/// resolved — handlers never see the raw slug again.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("X-Tenant-Id")
            .ok_or((StatusCode::BAD_REQUEST, "X-Tenant-Id header is required"))?;

        let raw = header
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "X-Tenant-Id header is not valid UTF-8"))?;

        let tenant_id = Uuid::parse_str(raw)
            .map_err(|_| (StatusCode::BAD_REQUEST, "X-Tenant-Id header is not a valid UUID"))?;

        Ok(TenantContext { tenant_id })
    }
}

impl TenantContext {
    /// Sets the session-scoped Postgres variable that row-level defense in
    /// depth relies on. The UUID has already been validated by the
    /// extractor, so this string is never built from unvalidated input.
    pub async fn scope_transaction(
        &self,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(), sqlx::Error> {
        let stmt = format!("SET LOCAL app.tenant_id = '{}'", self.tenant_id);
        sqlx::query(&stmt).execute(&mut **tx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn extracts_tenant_id_from_header() {
        let tenant_id = Uuid::new_v4();
        let req = Request::builder()
            .header("X-Tenant-Id", tenant_id.to_string())
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let ctx = TenantContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.tenant_id, tenant_id);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let req = Request::builder().body(()).unwrap();
        let (mut parts, _) = req.into_parts();
        let result = TenantContext::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_uuid() {
        let req = Request::builder()
            .header("X-Tenant-Id", "not-a-uuid")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let result = TenantContext::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }
}
