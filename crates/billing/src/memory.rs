//! In-memory billing provider for tests
//!
//! Records every call so tests can assert idempotency and "no provider call"
//! properties. Failures can be injected per operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, CheckoutSessionRequest, CreatedSession, PriceSpec, RemotePrice,
    RemoteProduct, RemotePromotion,
};

/// Provider operations, used to key call counters and injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    ListProducts,
    CreateProduct,
    UpdateProduct,
    ListPrices,
    CreatePrice,
    GetPrice,
    FindPromotion,
    CreateSession,
}

#[derive(Debug, Default)]
struct State {
    products: Vec<RemoteProduct>,
    prices: Vec<RemotePrice>,
    promotions: Vec<RemotePromotion>,
    sessions: Vec<CheckoutSessionRequest>,
    failures: HashMap<ProviderOp, String>,
    /// Product names whose price creation fails
    failing_products: Vec<String>,
    session_url: Option<Option<String>>,
}

/// Recording fake of [`BillingProvider`]
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<State>,
    calls: Mutex<HashMap<ProviderOp, usize>>,
    next_id: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, op: ProviderOp) -> BillingResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(op)
            .or_insert(0) += 1;

        match self.state().failures.get(&op) {
            Some(message) => Err(BillingError::StripeApi(message.clone())),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{:04}", prefix, n)
    }

    /// Number of times `op` was called
    pub fn calls(&self, op: ProviderOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .sum()
    }

    /// Number of write operations (product and price creation, updates, sessions)
    pub fn writes(&self) -> usize {
        self.calls(ProviderOp::CreateProduct)
            + self.calls(ProviderOp::UpdateProduct)
            + self.calls(ProviderOp::CreatePrice)
            + self.calls(ProviderOp::CreateSession)
    }

    pub fn reset_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Make every call to `op` fail with `message`
    pub fn fail_on(&self, op: ProviderOp, message: impl Into<String>) {
        self.state().failures.insert(op, message.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.failing_products.clear();
    }

    /// Make price creation fail for one product, leaving the others working
    pub fn fail_prices_for(&self, product_name: impl Into<String>) {
        self.state().failing_products.push(product_name.into());
    }

    /// Override the URL returned by created sessions; `None` simulates a missing URL
    pub fn set_session_url(&self, url: Option<String>) {
        self.state().session_url = Some(url);
    }

    pub fn seed_product(&self, name: &str, description: &str) -> RemoteProduct {
        let product = RemoteProduct {
            id: self.next_id("prod"),
            name: name.to_string(),
            description: Some(description.to_string()),
        };
        self.state().products.push(product.clone());
        product
    }

    pub fn seed_price(&self, product_id: &str, spec: &PriceSpec) -> RemotePrice {
        let price = RemotePrice {
            id: self.next_id("price"),
            product_id: product_id.to_string(),
            currency: spec.currency.clone(),
            unit_amount: spec.unit_amount,
            interval: spec.interval,
        };
        self.state().prices.push(price.clone());
        price
    }

    pub fn seed_promotion(&self, promotion: RemotePromotion) {
        self.state().promotions.push(promotion);
    }

    pub fn products(&self) -> Vec<RemoteProduct> {
        self.state().products.clone()
    }

    pub fn prices(&self) -> Vec<RemotePrice> {
        self.state().prices.clone()
    }

    /// Session requests received, in order
    pub fn sessions(&self) -> Vec<CheckoutSessionRequest> {
        self.state().sessions.clone()
    }
}

#[async_trait]
impl BillingProvider for InMemoryProvider {
    async fn list_active_products(&self) -> BillingResult<Vec<RemoteProduct>> {
        self.record(ProviderOp::ListProducts)?;
        Ok(self.state().products.clone())
    }

    async fn create_product(&self, name: &str, description: &str) -> BillingResult<RemoteProduct> {
        self.record(ProviderOp::CreateProduct)?;
        Ok(self.seed_product(name, description))
    }

    async fn update_product_description(
        &self,
        product_id: &str,
        description: &str,
    ) -> BillingResult<RemoteProduct> {
        self.record(ProviderOp::UpdateProduct)?;
        let mut state = self.state();
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| BillingError::StripeApi(format!("No such product: '{}'", product_id)))?;
        product.description = Some(description.to_string());
        Ok(product.clone())
    }

    async fn list_active_prices(&self, product_id: &str) -> BillingResult<Vec<RemotePrice>> {
        self.record(ProviderOp::ListPrices)?;
        Ok(self
            .state()
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn create_price(&self, product_id: &str, spec: &PriceSpec) -> BillingResult<RemotePrice> {
        self.record(ProviderOp::CreatePrice)?;
        {
            let state = self.state();
            let failing = state
                .products
                .iter()
                .find(|p| p.id == product_id)
                .is_some_and(|p| state.failing_products.contains(&p.name));
            if failing {
                return Err(BillingError::StripeApi(format!(
                    "price creation failed for {}",
                    product_id
                )));
            }
        }
        Ok(self.seed_price(product_id, spec))
    }

    async fn get_price(&self, price_id: &str) -> BillingResult<Option<RemotePrice>> {
        self.record(ProviderOp::GetPrice)?;
        Ok(self.state().prices.iter().find(|p| p.id == price_id).cloned())
    }

    async fn find_promotion_code(&self, code: &str) -> BillingResult<Option<RemotePromotion>> {
        self.record(ProviderOp::FindPromotion)?;
        Ok(self
            .state()
            .promotions
            .iter()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BillingResult<CreatedSession> {
        self.record(ProviderOp::CreateSession)?;
        let id = self.next_id("cs_test");
        let mut state = self.state();
        state.sessions.push(request.clone());
        let url = match &state.session_url {
            Some(url) => url.clone(),
            None => Some(format!("https://checkout.stripe.com/c/pay/{}", id)),
        };
        Ok(CreatedSession { id, url })
    }
}
