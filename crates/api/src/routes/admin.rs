//! Catalog sync trigger
//!
//! Protected by the `x-admin-token` header. Disabled when `ADMIN_SYNC_TOKEN`
//! is unset.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.admin_sync_token.as_deref() else {
        tracing::warn!("Catalog sync requested but ADMIN_SYNC_TOKEN is not set");
        return Err(ApiError::Forbidden);
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("Catalog sync rejected: bad admin token");
        Err(ApiError::Forbidden)
    }
}

fn failure(err: ApiError) -> Response {
    (
        err.status(),
        Json(json!({ "ok": false, "error": err.to_string() })),
    )
        .into_response()
}

/// Create missing products and prices; returns the identifier map
pub async fn sync_catalog(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return failure(e);
    }

    let report = match state.billing.sync_catalog().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Catalog sync failed");
            return failure(ApiError::from(e));
        }
    };

    let env = report.prices.to_env_lines();
    if report.is_success() {
        Json(json!({
            "ok": true,
            "prices": report.prices,
            "changes": report.changes,
            "env": env,
        }))
        .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "error": format!("{} catalog entries failed to sync", report.failures.len()),
                "prices": report.prices,
                "changes": report.changes,
                "failures": report.failures,
                "env": env,
            })),
        )
            .into_response()
    }
}

/// Writes a sync would make, without making them
pub async fn diff_catalog(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return failure(e);
    }

    match state.billing.diff_catalog().await {
        Ok(plan) => Json(json!({
            "ok": true,
            "up_to_date": plan.is_up_to_date(),
            "existing": plan.existing,
            "actions": plan.actions,
            "failures": plan.failures,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Catalog diff failed");
            failure(ApiError::from(e))
        }
    }
}
