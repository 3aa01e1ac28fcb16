//! HTTP surface: router assembly and the public ordering + webhook routes.

pub mod cart;
pub mod public;
pub mod state;
pub mod webhooks;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn health() -> &'static str {
    "ok"
}

pub fn metrics_endpoint(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/public/:tenant/cart/items",
            post(public::add_cart_item),
        )
        .route("/api/v1/public/:tenant/checkout", post(public::checkout))
        .route("/api/v1/public/orders/:reference", get(public::get_order))
        .route("/api/v1/webhooks/midtrans", post(webhooks::midtrans_webhook))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(metrics_endpoint(prometheus_handle))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
