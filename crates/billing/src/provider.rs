//! Billing provider port
//!
//! Every remote call made by the synchronizer, the promotion resolver and the
//! checkout builder goes through [`BillingProvider`]. The production
//! implementation is [`crate::client::StripeClient`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::RecurringInterval;
use crate::error::BillingResult;

/// Remote product record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Remote recurring price record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePrice {
    pub id: String,
    pub product_id: String,
    pub currency: String,
    /// Minor units (cents)
    pub unit_amount: i64,
    pub interval: RecurringInterval,
}

impl RemotePrice {
    pub fn matches(&self, spec: &PriceSpec) -> bool {
        self.currency.eq_ignore_ascii_case(&spec.currency)
            && self.unit_amount == spec.unit_amount
            && self.interval == spec.interval
    }
}

/// Price the synchronizer wants to exist on a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSpec {
    pub currency: String,
    pub unit_amount: i64,
    pub interval: RecurringInterval,
}

/// Coupon attached to a promotion code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCoupon {
    pub id: String,
    pub percent_off: Option<f64>,
    /// Minor units
    pub amount_off: Option<i64>,
    /// Unix timestamp after which the coupon can no longer be redeemed
    pub redeem_by: Option<i64>,
}

/// Remote promotion code record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePromotion {
    pub id: String,
    pub code: String,
    /// `None` when the coupon could not be read
    pub coupon: Option<RemoteCoupon>,
    pub times_redeemed: Option<i64>,
    pub max_redemptions: Option<i64>,
}

/// Discount attached to a checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDiscount {
    PromotionCode(String),
    Coupon(String),
}

/// One priced line of a checkout session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLineItem {
    pub price_id: String,
    pub quantity: u64,
}

/// Everything the provider needs to open a hosted checkout page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub discount: Option<SessionDiscount>,
    pub trial_period_days: u32,
    pub require_billing_address: bool,
    pub automatic_tax: bool,
    /// Lets the customer type a code on the hosted page; never set with `discount`
    pub allow_promotion_codes: bool,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

/// Session returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    pub url: Option<String>,
}

/// Remote billing system that owns products, prices, promotions and sessions
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Every active product, across all pages
    async fn list_active_products(&self) -> BillingResult<Vec<RemoteProduct>>;

    async fn create_product(&self, name: &str, description: &str) -> BillingResult<RemoteProduct>;

    async fn update_product_description(
        &self,
        product_id: &str,
        description: &str,
    ) -> BillingResult<RemoteProduct>;

    /// Every active recurring price on one product, across all pages
    async fn list_active_prices(&self, product_id: &str) -> BillingResult<Vec<RemotePrice>>;

    async fn create_price(&self, product_id: &str, spec: &PriceSpec) -> BillingResult<RemotePrice>;

    /// One price by id; `None` when it is archived or not recurring
    async fn get_price(&self, price_id: &str) -> BillingResult<Option<RemotePrice>>;

    /// First active promotion code matching `code` exactly
    async fn find_promotion_code(&self, code: &str) -> BillingResult<Option<RemotePromotion>>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BillingResult<CreatedSession>;
}
