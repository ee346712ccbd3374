// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! AutoDispatch Billing Module
//!
//! Subscription pricing and Stripe catalog management for the storefront.
//!
//! ## Features
//!
//! - **Catalog**: Compiled-in plans and per-truck add-ons
//! - **Pricing**: Deterministic line items and totals for a plan, cycle and add-on selection
//! - **Catalog Sync**: Idempotent creation of Stripe products and prices
//! - **Promotions**: Promotion code lookup with a readable discount summary
//! - **Checkout**: Server-side re-pricing and hosted checkout sessions

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod price_book;
pub mod pricing;
pub mod promotion;
pub mod provider;
pub mod sync;


use std::sync::Arc;

// Catalog
pub use catalog::{
    savings_percent, yearly_amount, AddOn, BillingCycle, Catalog, Plan, PlanId, RecurringInterval,
};

// Checkout
pub use checkout::{
    CallerVerifier, CheckoutBuilder, CheckoutRedirect, CheckoutRequest, CouponFallback,
    RedirectUrls, VerifiedCaller, TRIAL_PERIOD_DAYS,
};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult, ErrorKind};

// Memory
#[cfg(any(test, feature = "test-util"))]
pub use memory::{InMemoryProvider, ProviderOp};

// Price Book
pub use price_book::{AddOnPrices, PriceBook, PriceSlot, ProductPrices};

// Pricing
pub use pricing::{AddOnAmount, LineItem, LineItemKind, PriceQuote, PriceResolver};

// Promotions
pub use promotion::{describe_discount, PromotionResolver, PromotionSummary};

// Provider
pub use provider::{
    BillingProvider, CheckoutSessionRequest, CreatedSession, PriceSpec, RemoteCoupon, RemotePrice,
    RemoteProduct, RemotePromotion, SessionDiscount, SessionLineItem,
};

// Sync
pub use sync::{
    CatalogSynchronizer, SyncAction, SyncChanges, SyncEntry, SyncFailure, SyncPlan, SyncReport,
};

/// Main billing service that combines all billing functionality
pub struct BillingService {
    catalog: Arc<Catalog>,
    provider: Option<Arc<dyn BillingProvider>>,
    resolver: PriceResolver,
    checkout: CheckoutBuilder,
}

impl BillingService {
    /// Create a new billing service from environment variables
    ///
    /// A missing `STRIPE_SECRET_KEY` is not an error here; provider-backed
    /// operations report `MisconfiguredProvider` instead.
    pub fn from_env(verifier: Arc<dyn CallerVerifier>) -> BillingResult<Self> {
        let catalog = Catalog::builtin();
        let config = StripeConfig::from_env(&catalog)?;

        let provider: Option<Arc<dyn BillingProvider>> = match config.client() {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::error!(error = %e, "Stripe is not configured; checkout and sync are disabled");
                None
            }
        };

        Self::new(catalog, config, provider, verifier)
    }

    /// Create a new billing service with explicit config
    pub fn new(
        catalog: Catalog,
        config: StripeConfig,
        provider: Option<Arc<dyn BillingProvider>>,
        verifier: Arc<dyn CallerVerifier>,
    ) -> BillingResult<Self> {
        catalog.validate()?;
        let catalog = Arc::new(catalog);
        let resolver = PriceResolver::new(catalog.clone(), config.price_book);
        let checkout = CheckoutBuilder::new(
            resolver.clone(),
            provider.clone(),
            verifier,
            config.coupon_fallback,
        );

        Ok(Self {
            catalog,
            provider,
            resolver,
            checkout,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &PriceResolver {
        &self.resolver
    }

    pub fn checkout(&self) -> &CheckoutBuilder {
        &self.checkout
    }

    pub fn is_provider_configured(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> BillingResult<Arc<dyn BillingProvider>> {
        self.provider.clone().ok_or_else(|| {
            BillingError::MisconfiguredProvider("STRIPE_SECRET_KEY not set".to_string())
        })
    }

    /// Price a selection without touching the provider
    pub fn quote<S: AsRef<str>>(
        &self,
        plan_id: &str,
        cycle: &str,
        add_on_ids: &[S],
    ) -> BillingResult<PriceQuote> {
        self.resolver.resolve(plan_id, cycle, add_on_ids)
    }

    /// Look up a promotion code; blank codes fail before any provider check
    pub async fn verify_promotion(&self, code: &str) -> BillingResult<PromotionSummary> {
        if code.trim().is_empty() {
            return Err(BillingError::EmptyCode);
        }
        PromotionResolver::new(self.provider()?).resolve(code).await
    }

    /// Bring the provider in line with the catalog
    pub async fn sync_catalog(&self) -> BillingResult<SyncReport> {
        CatalogSynchronizer::new(self.provider()?)
            .sync(&self.catalog)
            .await
    }

    /// Writes a sync would make, without making them
    pub async fn diff_catalog(&self) -> BillingResult<SyncPlan> {
        CatalogSynchronizer::new(self.provider()?)
            .diff(&self.catalog)
            .await
    }
}
