#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Catalog sync command
//!
//! Brings Stripe in line with the built-in catalog and prints the resulting
//! price ids, as JSON or as `PRICE_*=...` lines for the environment file.
//! Safe to re-run: existing products and prices are reused.

use std::sync::Arc;

use autodispatch_billing::{Catalog, CatalogSynchronizer, StripeConfig, SyncPlan, SyncReport};
use clap::Parser;
use tracing::{error, info, warn};

/// Sync the subscription catalog to Stripe
#[derive(Debug, Parser)]
#[command(name = "sync-catalog", version, about, long_about = None)]
struct Cli {
    /// Report the writes a sync would make without making them
    #[arg(long)]
    dry_run: bool,

    /// Print PRICE_* environment lines instead of JSON
    #[arg(long)]
    env: bool,
}

fn render_report(report: &SyncReport, env: bool) -> anyhow::Result<String> {
    if env {
        Ok(report.prices.to_env_lines().join("\n"))
    } else {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

fn render_plan(plan: &SyncPlan) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(plan)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging on stderr; stdout carries the result
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let catalog = Catalog::builtin();
    catalog.validate()?;
    let client = StripeConfig::from_env(&catalog)?.client()?;
    let synchronizer = CatalogSynchronizer::new(Arc::new(client));

    if cli.dry_run {
        let plan = synchronizer.diff(&catalog).await?;
        if plan.is_up_to_date() {
            info!("Catalog is up to date");
        } else {
            info!(actions = plan.actions.len(), "Catalog sync would make changes");
        }
        println!("{}", render_plan(&plan)?);
        if !plan.failures.is_empty() {
            anyhow::bail!("{} catalog entries could not be checked", plan.failures.len());
        }
        return Ok(());
    }

    let report = synchronizer.sync(&catalog).await?;
    info!(
        products_created = report.changes.products_created,
        products_updated = report.changes.products_updated,
        prices_created = report.changes.prices_created,
        prices_reused = report.changes.prices_reused,
        "Catalog sync finished"
    );
    println!("{}", render_report(&report, cli.env)?);

    if !report.is_success() {
        for failure in &report.failures {
            error!(entry = %failure.entry, error = %failure.message, "Catalog entry failed to sync");
        }
        warn!("Re-run after fixing the errors above; completed entries are reused");
        anyhow::bail!("{} catalog entries failed to sync", report.failures.len());
    }

    Ok(())
}
