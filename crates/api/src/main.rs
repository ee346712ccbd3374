//! AutoDispatch API Server
//!
//! Serves the storefront's billing endpoints: catalog display, quoting,
//! promotion code checks, hosted checkout and the admin catalog sync trigger.

use std::net::SocketAddr;
use std::sync::Arc;

use autodispatch_api::{auth::SupabaseVerifier, build_app, AppState, Config};
use autodispatch_billing::BillingService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,autodispatch_api=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        "Starting AutoDispatch API Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let verifier = Arc::new(SupabaseVerifier::from_config(&config));
    let billing = BillingService::from_env(verifier)?;
    if !billing.is_provider_configured() {
        tracing::warn!("Checkout, coupon checks and catalog sync will fail until STRIPE_SECRET_KEY is set");
    }
    if config.admin_sync_token.is_none() {
        tracing::info!("ADMIN_SYNC_TOKEN not set; catalog sync trigger disabled");
    }

    let addr: SocketAddr = config.bind_address.parse()?;
    let app = build_app(AppState::new(config, billing));

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
