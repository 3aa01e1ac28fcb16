//! Error & i18n Translation (C12)
//! Mission: one closed taxonomy, mapped to HTTP status + localized message;
//! database/driver errors never reach the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Closed error taxonomy (spec §7). Every fallible operation in this crate
/// resolves to one of these kinds before crossing the HTTP boundary.
#[derive(Debug)]
pub enum AppError {
    Unauthenticated,
    Forbidden,
    NotFound(&'static str),
    Conflict(String),
    Validation(String),
    OutOfStock(String),
    OutsideServiceArea,
    BelowMinimumOrder,
    PaymentRejected(String),
    PaymentGatewayUnavailable,
    IntegrityFailed,
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation",
            AppError::OutOfStock(_) => "out_of_stock",
            AppError::OutsideServiceArea => "outside_service_area",
            AppError::BelowMinimumOrder => "below_minimum_order",
            AppError::PaymentRejected(_) => "payment_rejected",
            AppError::PaymentGatewayUnavailable => "payment_gateway_unavailable",
            AppError::IntegrityFailed => "integrity_failed",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::OutOfStock(_) => StatusCode::CONFLICT,
            AppError::OutsideServiceArea => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BelowMinimumOrder => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentGatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::IntegrityFailed => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Localized message selection. Only `en` is catalogued here — the spec
    /// keeps the message strings themselves out of scope; this is the
    /// mechanism the catalog plugs into.
    fn message(&self, locale: &str) -> String {
        MESSAGE_CATALOG
            .iter()
            .find(|(code, loc, _)| *code == self.code() && *loc == locale)
            .map(|(_, _, msg)| msg.to_string())
            .unwrap_or_else(|| self.fallback_message())
    }

    fn fallback_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "authentication required".into(),
            AppError::Forbidden => "insufficient permissions".into(),
            AppError::NotFound(entity) => format!("{entity} not found"),
            AppError::Conflict(detail) => detail.clone(),
            AppError::Validation(detail) => detail.clone(),
            AppError::OutOfStock(product) => format!("insufficient stock for {product}"),
            AppError::OutsideServiceArea => "address is outside the service area".into(),
            AppError::BelowMinimumOrder => "order total is below the minimum".into(),
            AppError::PaymentRejected(detail) => detail.clone(),
            AppError::PaymentGatewayUnavailable => "payment gateway unavailable, try again".into(),
            AppError::IntegrityFailed => "internal error".into(),
            AppError::Internal(_) => "internal error".into(),
        }
    }
}

/// `(error_code, locale, message)`. Extend per-locale without touching call sites.
const MESSAGE_CATALOG: &[(&str, &str, &str)] = &[
    ("out_of_stock", "en", "one or more items are out of stock"),
    ("outside_service_area", "en", "this address is outside our delivery area"),
    ("below_minimum_order", "en", "order total is below the minimum for this fulfillment mode"),
    ("payment_rejected", "en", "payment was rejected by the gateway"),
];

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            error!(error = %detail, "internal error");
        }
        let status = self.status();
        let code = self.code();
        let message = self.message("en");
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("resource"),
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    AppError::Conflict("duplicate value violates a unique constraint".into())
                } else {
                    AppError::Internal(db_err.to_string())
                }
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::OutOfStock("sku".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::OutsideServiceArea.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::PaymentRejected("x".into()).status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(AppError::PaymentGatewayUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        // sqlx::Error isn't constructible generically here; the mapping logic
        // itself is exercised indirectly by repo-layer integration tests.
        assert_eq!(AppError::Conflict("dup".into()).code(), "conflict");
    }
}
