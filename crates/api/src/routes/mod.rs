//! HTTP routes

pub mod admin;
pub mod billing;


use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/billing/catalog", get(billing::get_catalog))
        .route("/api/billing/quote", post(billing::quote))
        .route(
            "/api/billing/create-checkout-session",
            post(billing::create_checkout_session),
        )
        .route("/api/stripe/verify-coupon", post(billing::verify_coupon))
        .route(
            "/api/stripe/create-products",
            post(admin::sync_catalog).get(admin::diff_catalog),
        )
        .with_state(state)
}
