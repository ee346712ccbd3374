//! Hosted checkout sessions
//!
//! The builder re-prices the selection server-side, attaches at most one
//! discount and asks the provider for a hosted session URL.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{BillingCycle, PlanId};
use crate::error::{BillingError, BillingResult};
use crate::pricing::{LineItem, LineItemKind, PriceResolver};
use crate::promotion::PromotionResolver;
use crate::provider::{BillingProvider, CheckoutSessionRequest, SessionDiscount, SessionLineItem};
use crate::sync::price_spec;

/// Free trial attached to every subscription checkout
pub const TRIAL_PERIOD_DAYS: u32 = 14;

/// Identity of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedCaller {
    pub user_id: String,
    pub email: Option<String>,
}

/// Auth collaborator that turns a bearer credential into a caller
#[async_trait]
pub trait CallerVerifier: Send + Sync {
    /// `Err(BillingError::Unauthorized)` when the credential is absent or invalid
    async fn verify(&self, credential: Option<&str>) -> BillingResult<VerifiedCaller>;
}

/// What to do with a coupon string that matches no promotion code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponFallback {
    /// Pass it to the provider as a raw coupon id
    #[default]
    Coupon,
    /// Reject the checkout with `InvalidPromotion`
    Reject,
}

impl FromStr for CouponFallback {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coupon" => Ok(CouponFallback::Coupon),
            "reject" => Ok(CouponFallback::Reject),
            other => Err(BillingError::Internal(format!(
                "CHECKOUT_COUPON_FALLBACK must be 'coupon' or 'reject', got '{}'",
                other
            ))),
        }
    }
}

/// Coupon ids are ASCII alphanumerics, `_` and `-`
pub fn looks_like_coupon_id(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn describe_item(kind: &LineItemKind) -> String {
    match kind {
        LineItemKind::Plan(id) => format!("plan {}", id),
        LineItemKind::AddOn(id) => format!("add-on {}", id),
    }
}

/// The remote price must charge exactly what the resolver quoted
async fn confirm_price(
    provider: &dyn BillingProvider,
    currency: &str,
    cycle: BillingCycle,
    item: &LineItem,
    price_id: &str,
) -> BillingResult<()> {
    let expected = price_spec(currency, cycle, item.amount)?;
    let remote = provider
        .get_price(price_id)
        .await
        .map_err(BillingError::into_checkout_error)?;

    match remote {
        Some(price) if price.matches(&expected) => Ok(()),
        Some(price) => {
            tracing::error!(
                item = %describe_item(&item.kind),
                price_id = %price_id,
                charged = price.unit_amount,
                quoted = expected.unit_amount,
                "Configured price does not match the quote"
            );
            Err(BillingError::PlanNotPriceable(format!(
                "price {} for {} charges {} {} per {}, quoted {}",
                price_id,
                describe_item(&item.kind),
                price.unit_amount,
                price.currency,
                price.interval,
                expected.unit_amount
            )))
        }
        None => Err(BillingError::PlanNotPriceable(format!(
            "price {} for {} is not an active recurring price",
            price_id,
            describe_item(&item.kind)
        ))),
    }
}

/// Checkout input as received from the storefront
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub plan: String,
    #[serde(default, rename = "billing")]
    pub cycle: String,
    #[serde(default)]
    pub add_ons: Vec<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Where the hosted page sends the customer afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl RedirectUrls {
    /// Standard storefront targets under `base_url`
    pub fn for_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            success_url: format!("{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}", base),
            cancel_url: format!("{}/billing/choose-plan", base),
        }
    }
}

/// Successful checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
}

/// Builds hosted checkout sessions
pub struct CheckoutBuilder {
    resolver: PriceResolver,
    provider: Option<Arc<dyn BillingProvider>>,
    verifier: Arc<dyn CallerVerifier>,
    coupon_fallback: CouponFallback,
}

impl CheckoutBuilder {
    pub fn new(
        resolver: PriceResolver,
        provider: Option<Arc<dyn BillingProvider>>,
        verifier: Arc<dyn CallerVerifier>,
        coupon_fallback: CouponFallback,
    ) -> Self {
        Self {
            resolver,
            provider,
            verifier,
            coupon_fallback,
        }
    }

    /// Verify the caller, re-price the selection and open a hosted session
    pub async fn build(
        &self,
        request: &CheckoutRequest,
        credential: Option<&str>,
        urls: &RedirectUrls,
    ) -> BillingResult<CheckoutRedirect> {
        let caller = self.verifier.verify(credential).await?;

        let plan: PlanId = request.plan.parse()?;
        let cycle: BillingCycle = request.cycle.parse()?;
        if plan == PlanId::Enterprise {
            return Err(BillingError::InvalidPlan(
                "ENTERPRISE is sales-quoted and cannot be checked out".to_string(),
            ));
        }

        let quote = self.resolver.quote(plan, cycle, request.add_ons.as_slice())?;

        let mut line_items = Vec::with_capacity(quote.line_items.len());
        for item in &quote.line_items {
            let price_id = item.price_ref.clone().ok_or_else(|| {
                let what = describe_item(&item.kind);
                tracing::error!(item = %what, cycle = %cycle, "No price configured for checkout item");
                BillingError::PlanNotPriceable(format!("missing price for {} ({})", what, cycle))
            })?;
            line_items.push(SessionLineItem {
                price_id,
                quantity: item.quantity,
            });
        }

        let provider = self.provider.as_ref().ok_or_else(|| {
            tracing::error!("Checkout attempted without STRIPE_SECRET_KEY");
            BillingError::MisconfiguredProvider("STRIPE_SECRET_KEY not set".to_string())
        })?;

        for (item, line) in quote.line_items.iter().zip(&line_items) {
            confirm_price(provider.as_ref(), &quote.currency, cycle, item, &line.price_id).await?;
        }

        let discount = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(self.resolve_discount(provider, code).await?),
            _ => None,
        };

        let add_on_ids: Vec<&str> = quote.add_on_amounts.iter().map(|a| a.id.as_str()).collect();
        let mut metadata = BTreeMap::new();
        metadata.insert("plan".to_string(), plan.to_string());
        metadata.insert("billing".to_string(), cycle.to_string());
        metadata.insert("add_ons".to_string(), add_on_ids.join(","));
        metadata.insert("user_id".to_string(), caller.user_id.clone());

        let allow_promotion_codes = discount.is_none();
        let session_request = CheckoutSessionRequest {
            line_items,
            discount,
            trial_period_days: TRIAL_PERIOD_DAYS,
            require_billing_address: true,
            automatic_tax: true,
            allow_promotion_codes,
            success_url: urls.success_url.clone(),
            cancel_url: urls.cancel_url.clone(),
            metadata,
        };

        let session = provider
            .create_checkout_session(&session_request)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %caller.user_id, error = %e, "Checkout session creation failed");
                e.into_checkout_error()
            })?;

        let url = session.url.ok_or_else(|| {
            BillingError::CheckoutProviderError("Checkout session has no URL".to_string())
        })?;

        tracing::info!(
            user_id = %caller.user_id,
            plan = %plan,
            billing = %cycle,
            session_id = %session.id,
            total = quote.total,
            "Created checkout session"
        );

        Ok(CheckoutRedirect {
            session_id: session.id,
            url,
        })
    }

    async fn resolve_discount(
        &self,
        provider: &Arc<dyn BillingProvider>,
        code: &str,
    ) -> BillingResult<SessionDiscount> {
        let summary = PromotionResolver::new(provider.clone())
            .resolve(code)
            .await
            .map_err(BillingError::into_checkout_error)?;

        if let (true, Some(promotion_id)) = (summary.valid, summary.promotion_id) {
            return Ok(SessionDiscount::PromotionCode(promotion_id));
        }

        match self.coupon_fallback {
            CouponFallback::Coupon if looks_like_coupon_id(code) => {
                tracing::debug!(code = %code, "No promotion code matched, passing as coupon id");
                Ok(SessionDiscount::Coupon(code.to_string()))
            }
            _ => Err(BillingError::InvalidPromotion(code.to_string())),
        }
    }
}
