//! Application state

use std::sync::Arc;

use autodispatch_billing::BillingService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(config: Config, billing: BillingService) -> Self {
        Self {
            config,
            billing: Arc::new(billing),
        }
    }
}
