//! Storefront billing routes
//!
//! Plan display, quoting, promotion code checks and hosted checkout.

use autodispatch_billing::{
    savings_percent, BillingCycle, BillingError, CheckoutRequest, PriceQuote, PromotionSummary,
    RedirectUrls,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    auth::extract_bearer_token,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Fallback origin when neither config nor the request names one
const LOCAL_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Serialize)]
pub struct PlanView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub popular: bool,
    pub features: Vec<String>,
    /// `None` for sales-quoted plans
    pub monthly: Option<u32>,
    pub yearly: Option<u32>,
    pub savings_percent: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AddOnView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub monthly: u32,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub currency: String,
    pub plans: Vec<PlanView>,
    pub add_ons: Vec<AddOnView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub plan: String,
    pub billing: String,
    #[serde(default)]
    pub add_ons: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyCouponRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyCouponResponse {
    pub ok: bool,
    pub code: Option<String>,
    pub discount: Option<String>,
    pub expires: Option<String>,
    pub times_redeemed: Option<i64>,
    pub max_redemptions: Option<i64>,
    pub expired: bool,
    pub exhausted: bool,
}

impl From<PromotionSummary> for VerifyCouponResponse {
    fn from(summary: PromotionSummary) -> Self {
        Self {
            ok: summary.valid,
            code: summary.code,
            discount: summary.discount_description,
            expires: summary.expires_on,
            times_redeemed: summary.times_redeemed,
            max_redemptions: summary.max_redemptions,
            expired: summary.expired,
            exhausted: summary.exhausted,
        }
    }
}

/// Plans and add-ons with their per-cycle prices
pub async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    let catalog = state.billing.catalog();

    let plans = catalog
        .plans
        .iter()
        .map(|plan| PlanView {
            id: plan.id.to_string(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            popular: plan.popular,
            features: plan.features.clone(),
            monthly: plan.amount_for(BillingCycle::Monthly),
            yearly: plan.amount_for(BillingCycle::Yearly),
            savings_percent: plan
                .is_priced()
                .then(|| savings_percent(plan.yearly_discount)),
        })
        .collect();

    let add_ons = catalog
        .add_ons
        .iter()
        .map(|add_on| AddOnView {
            id: add_on.id.clone(),
            title: add_on.title.clone(),
            description: add_on.description.clone(),
            monthly: add_on.monthly,
        })
        .collect();

    Json(CatalogResponse {
        currency: catalog.currency.clone(),
        plans,
        add_ons,
    })
}

/// Price a selection for display
pub async fn quote(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<PriceQuote>> {
    let req: QuoteRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid quote request: {}", e)))?;
    let quote = state
        .billing
        .quote(&req.plan, &req.billing, req.add_ons.as_slice())?;
    Ok(Json(quote))
}

/// Origin for checkout redirects
///
/// Configured site URL first, then the request's Host, then localhost.
fn redirect_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.base_url {
        return base.clone();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty());

    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|h| h.to_str().ok())
                .and_then(|p| p.split(',').next())
                .map(str::trim)
                .filter(|p| *p == "http" || *p == "https")
                .unwrap_or("http");
            format!("{}://{}", scheme, host)
        }
        None => LOCAL_ORIGIN.to_string(),
    }
}

/// Create a hosted checkout session for a subscription
///
/// A body that is not valid JSON is treated as an empty request and fails
/// plan validation.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<CheckoutSessionResponse>> {
    let request: CheckoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    let credential = extract_bearer_token(&headers);
    let urls = RedirectUrls::for_base(&redirect_base(&state, &headers));

    let redirect = state
        .billing
        .checkout()
        .build(&request, credential.as_deref(), &urls)
        .await
        .map_err(|e| {
            if matches!(e, BillingError::Unauthorized(_)) {
                tracing::warn!(plan = %request.plan, "Unauthenticated checkout rejected");
            }
            ApiError::from(e)
        })?;

    Ok(Json(CheckoutSessionResponse { url: redirect.url }))
}

fn coupon_failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "ok": false, "error": message.into() })),
    )
        .into_response()
}

/// Look up a promotion code for display
pub async fn verify_coupon(State(state): State<AppState>, body: Bytes) -> Response {
    let req: VerifyCouponRequest = serde_json::from_slice(&body).unwrap_or_default();
    let code = req.code.unwrap_or_default();

    match state.billing.verify_promotion(&code).await {
        Ok(summary) if summary.valid => Json(VerifyCouponResponse::from(summary)).into_response(),
        Ok(_) => coupon_failure(StatusCode::OK, "Invalid code"),
        Err(BillingError::EmptyCode) => {
            coupon_failure(StatusCode::BAD_REQUEST, "No code provided")
        }
        Err(e) => {
            tracing::error!(code = %code, error = %e, "Promotion code lookup failed");
            coupon_failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
