//! Stripe client configuration and the Stripe-backed provider

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionBillingAddressCollection, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionAutomaticTax, CreateCheckoutSessionDiscounts,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData, CreatePrice,
    CreatePriceRecurring, CreatePriceRecurringInterval, CreateProduct, Currency, Expandable,
    IdOrCreate, ListPrices, ListProducts, ListPromotionCodes, Price, PriceId, Product, ProductId,
    PromotionCode, UpdateProduct,
};

use crate::catalog::{Catalog, RecurringInterval};
use crate::checkout::CouponFallback;
use crate::error::{BillingError, BillingResult};
use crate::price_book::PriceBook;
use crate::provider::{
    BillingProvider, CheckoutSessionRequest, CreatedSession, PriceSpec, RemoteCoupon, RemotePrice,
    RemoteProduct, RemotePromotion, SessionDiscount,
};

/// Largest page Stripe returns for list calls
const LIST_LIMIT: u64 = 100;

/// Configuration for Stripe billing
#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    /// Stripe secret API key; `None` leaves every provider-backed call misconfigured
    pub secret_key: Option<String>,
    /// Price IDs for each plan and add-on
    pub price_book: PriceBook,
    /// What checkout does with a coupon string that matches no promotion code
    pub coupon_fallback: CouponFallback,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env(catalog: &Catalog) -> BillingResult<Self> {
        Self::from_lookup(catalog, |key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup
    pub fn from_lookup<F>(catalog: &Catalog, lookup: F) -> BillingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let coupon_fallback = match lookup("CHECKOUT_COUPON_FALLBACK") {
            Some(value) if !value.trim().is_empty() => value.trim().parse()?,
            _ => CouponFallback::default(),
        };

        Ok(Self {
            secret_key,
            price_book: PriceBook::from_lookup(catalog, &lookup),
            coupon_fallback,
        })
    }

    /// Build the Stripe client, failing when no secret key is configured
    pub fn client(&self) -> BillingResult<StripeClient> {
        match &self.secret_key {
            Some(key) => Ok(StripeClient::new(key)),
            None => Err(BillingError::MisconfiguredProvider(
                "STRIPE_SECRET_KEY not set".to_string(),
            )),
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
}

impl StripeClient {
    /// Create a new Stripe client for a secret key
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient").finish_non_exhaustive()
    }
}

fn parse_currency(currency: &str) -> BillingResult<Currency> {
    match currency.to_ascii_lowercase().as_str() {
        "usd" => Ok(Currency::USD),
        "cad" => Ok(Currency::CAD),
        "eur" => Ok(Currency::EUR),
        "gbp" => Ok(Currency::GBP),
        other => Err(BillingError::Internal(format!(
            "unsupported currency: {}",
            other
        ))),
    }
}

fn parse_product_id(product_id: &str) -> BillingResult<ProductId> {
    product_id
        .parse::<ProductId>()
        .map_err(|e| BillingError::StripeApi(format!("Invalid product ID: {}", e)))
}

fn parse_price_id(price_id: &str) -> BillingResult<PriceId> {
    price_id
        .parse::<PriceId>()
        .map_err(|e| BillingError::StripeApi(format!("Invalid price ID: {}", e)))
}

fn remote_product(product: Product) -> RemoteProduct {
    RemoteProduct {
        id: product.id.to_string(),
        name: product.name.unwrap_or_default(),
        description: product.description,
    }
}

/// `None` for one-off prices and intervals the catalog never uses
fn remote_price(price: Price) -> Option<RemotePrice> {
    let interval = match price.recurring.as_ref()?.interval {
        stripe::RecurringInterval::Month => RecurringInterval::Month,
        stripe::RecurringInterval::Year => RecurringInterval::Year,
        _ => return None,
    };

    let product_id = match price.product.as_ref()? {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(product) => product.id.to_string(),
    };

    Some(RemotePrice {
        id: price.id.to_string(),
        product_id,
        currency: price.currency.map(|c| c.to_string()).unwrap_or_default(),
        unit_amount: price.unit_amount?,
        interval,
    })
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn list_active_products(&self) -> BillingResult<Vec<RemoteProduct>> {
        let mut params = ListProducts::new();
        params.active = Some(true);
        params.limit = Some(LIST_LIMIT);

        let mut products = Vec::new();
        loop {
            let page = Product::list(&self.client, &params).await?;
            params.starting_after = page.data.last().map(|p| p.id.clone());
            let has_more = page.has_more && params.starting_after.is_some();
            products.extend(page.data.into_iter().map(remote_product));
            if !has_more {
                break;
            }
        }
        Ok(products)
    }

    async fn create_product(&self, name: &str, description: &str) -> BillingResult<RemoteProduct> {
        let mut params = CreateProduct::new(name);
        params.description = Some(description);

        let product = Product::create(&self.client, params).await?;
        tracing::info!(product_id = %product.id, name = %name, "Created Stripe product");
        Ok(remote_product(product))
    }

    async fn update_product_description(
        &self,
        product_id: &str,
        description: &str,
    ) -> BillingResult<RemoteProduct> {
        let id = parse_product_id(product_id)?;
        let mut params = UpdateProduct::new();
        params.description = Some(description.to_string());

        let product = Product::update(&self.client, &id, params).await?;
        tracing::info!(product_id = %product.id, "Updated Stripe product description");
        Ok(remote_product(product))
    }

    async fn list_active_prices(&self, product_id: &str) -> BillingResult<Vec<RemotePrice>> {
        let mut params = ListPrices::new();
        params.active = Some(true);
        params.limit = Some(LIST_LIMIT);
        params.product = Some(IdOrCreate::Id(product_id));

        let mut prices = Vec::new();
        loop {
            let page = Price::list(&self.client, &params).await?;
            params.starting_after = page.data.last().map(|p| p.id.clone());
            let has_more = page.has_more && params.starting_after.is_some();
            prices.extend(page.data.into_iter().filter_map(remote_price));
            if !has_more {
                break;
            }
        }
        Ok(prices)
    }

    async fn create_price(&self, product_id: &str, spec: &PriceSpec) -> BillingResult<RemotePrice> {
        let mut params = CreatePrice::new(parse_currency(&spec.currency)?);
        params.product = Some(IdOrCreate::Id(product_id));
        params.unit_amount = Some(spec.unit_amount);
        params.recurring = Some(CreatePriceRecurring {
            interval: match spec.interval {
                RecurringInterval::Month => CreatePriceRecurringInterval::Month,
                RecurringInterval::Year => CreatePriceRecurringInterval::Year,
            },
            interval_count: None,
            aggregate_usage: None,
            trial_period_days: None,
            usage_type: None,
        });

        let price = Price::create(&self.client, params).await?;
        tracing::info!(
            product_id = %product_id,
            price_id = %price.id,
            unit_amount = spec.unit_amount,
            interval = %spec.interval,
            "Created Stripe price"
        );

        Ok(RemotePrice {
            id: price.id.to_string(),
            product_id: product_id.to_string(),
            currency: spec.currency.clone(),
            unit_amount: spec.unit_amount,
            interval: spec.interval,
        })
    }

    async fn get_price(&self, price_id: &str) -> BillingResult<Option<RemotePrice>> {
        let id = parse_price_id(price_id)?;
        let price = match Price::retrieve(&self.client, &id, &[]).await {
            Ok(price) => price,
            Err(stripe::StripeError::Stripe(e)) if e.http_status == 404 => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if price.active == Some(false) {
            return Ok(None);
        }
        Ok(remote_price(price))
    }

    async fn find_promotion_code(&self, code: &str) -> BillingResult<Option<RemotePromotion>> {
        let mut params = ListPromotionCodes::new();
        params.code = Some(code);
        params.active = Some(true);
        params.limit = Some(1);
        params.expand = &["data.coupon"];

        let codes = PromotionCode::list(&self.client, &params).await?;
        Ok(codes.data.into_iter().next().map(|promo| RemotePromotion {
            id: promo.id.to_string(),
            code: promo.code,
            coupon: Some(RemoteCoupon {
                id: promo.coupon.id.to_string(),
                percent_off: promo.coupon.percent_off,
                amount_off: promo.coupon.amount_off,
                redeem_by: promo.coupon.redeem_by,
            }),
            times_redeemed: Some(promo.times_redeemed),
            max_redemptions: promo.max_redemptions,
        }))
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BillingResult<CreatedSession> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);

        params.line_items = Some(
            request
                .line_items
                .iter()
                .map(|item| CreateCheckoutSessionLineItems {
                    price: Some(item.price_id.clone()),
                    quantity: Some(item.quantity),
                    ..Default::default()
                })
                .collect(),
        );

        if let Some(discount) = &request.discount {
            let entry = match discount {
                SessionDiscount::PromotionCode(id) => CreateCheckoutSessionDiscounts {
                    promotion_code: Some(id.clone()),
                    ..Default::default()
                },
                SessionDiscount::Coupon(id) => CreateCheckoutSessionDiscounts {
                    coupon: Some(id.clone()),
                    ..Default::default()
                },
            };
            params.discounts = Some(vec![entry]);
        }
        if request.allow_promotion_codes {
            params.allow_promotion_codes = Some(true);
        }

        if request.require_billing_address {
            params.billing_address_collection =
                Some(CheckoutSessionBillingAddressCollection::Required);
        }

        params.automatic_tax = Some(CreateCheckoutSessionAutomaticTax {
            enabled: request.automatic_tax,
            ..Default::default()
        });

        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            trial_period_days: Some(request.trial_period_days),
            ..Default::default()
        });

        let metadata: HashMap<String, String> = request
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.metadata = Some(metadata);

        let session = CheckoutSession::create(&self.client, params).await?;
        tracing::info!(session_id = %session.id, "Created Stripe checkout session");

        Ok(CreatedSession {
            id: session.id.to_string(),
            url: session.url,
        })
    }
}
