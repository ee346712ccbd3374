//! Catalog synchronization
//!
//! Reconciles the catalog against the provider's products and prices. Nothing
//! is stored locally: every run re-reads the provider's records and only
//! creates what is missing, so repeated runs converge on the same ids.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{BillingCycle, Catalog, PlanId};
use crate::error::{BillingError, BillingResult};
use crate::price_book::{AddOnPrices, PriceBook, PriceSlot, ProductPrices};
use crate::provider::{BillingProvider, PriceSpec, RemotePrice, RemoteProduct};

/// Largest unit amount the provider accepts, in minor units
pub const MAX_UNIT_AMOUNT: i64 = 99_999_999;

/// Catalog entry a sync step works on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SyncEntry {
    Plan(PlanId),
    AddOn(String),
}

impl fmt::Display for SyncEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEntry::Plan(id) => write!(f, "plan {}", id),
            SyncEntry::AddOn(id) => write!(f, "add-on {}", id),
        }
    }
}

/// A write a sync would perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    CreateProduct {
        entry: SyncEntry,
        name: String,
    },
    UpdateDescription {
        entry: SyncEntry,
        product_id: String,
    },
    CreatePrice {
        entry: SyncEntry,
        /// `None` when the product itself does not exist yet
        product_id: Option<String>,
        slot: PriceSlot,
        unit_amount: i64,
    },
}

/// Counters of what a sync did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncChanges {
    pub products_created: usize,
    pub products_updated: usize,
    pub prices_created: usize,
    pub prices_reused: usize,
}

impl SyncChanges {
    /// Remote objects created or modified
    pub fn writes(&self) -> usize {
        self.products_created + self.products_updated + self.prices_created
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub entry: SyncEntry,
    pub message: String,
}

/// Outcome of [`CatalogSynchronizer::sync`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub prices: PriceBook,
    pub changes: SyncChanges,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of [`CatalogSynchronizer::diff`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    /// Ids that already exist remotely
    pub existing: PriceBook,
    pub actions: Vec<SyncAction>,
    pub failures: Vec<SyncFailure>,
}

impl SyncPlan {
    pub fn is_up_to_date(&self) -> bool {
        self.actions.is_empty() && self.failures.is_empty()
    }
}

/// What one catalog entry should look like remotely
struct EntryTarget<'a> {
    entry: SyncEntry,
    name: &'a str,
    description: &'a str,
    amounts: Vec<(PriceSlot, u32)>,
}

fn entry_targets(catalog: &Catalog) -> Vec<EntryTarget<'_>> {
    let mut targets = Vec::with_capacity(catalog.plans.len() + catalog.add_ons.len());

    for plan in &catalog.plans {
        // Sales-quoted plans get a product but no prices
        let amounts = BillingCycle::ALL
            .into_iter()
            .filter_map(|cycle| {
                plan.amount_for(cycle)
                    .map(|amount| (PriceSlot::Cycle(cycle), amount))
            })
            .collect();
        targets.push(EntryTarget {
            entry: SyncEntry::Plan(plan.id),
            name: &plan.name,
            description: &plan.description,
            amounts,
        });
    }

    for add_on in &catalog.add_ons {
        let mut amounts = vec![(PriceSlot::Cycle(BillingCycle::Monthly), add_on.monthly)];
        for plan in catalog.priced_plans() {
            amounts.push((
                PriceSlot::YearlyFor(plan.id),
                BillingCycle::Yearly.amount_for(add_on.monthly, plan.yearly_discount),
            ));
        }
        targets.push(EntryTarget {
            entry: SyncEntry::AddOn(add_on.id.clone()),
            name: &add_on.title,
            description: &add_on.description,
            amounts,
        });
    }

    targets
}

/// Ids found or created for one entry
#[derive(Debug, Default)]
struct EntryIds {
    product_id: Option<String>,
    prices: Vec<(PriceSlot, String)>,
}

fn target_specs(
    currency: &str,
    target: &EntryTarget<'_>,
) -> BillingResult<Vec<(PriceSlot, PriceSpec)>> {
    target
        .amounts
        .iter()
        .map(|(slot, amount)| price_spec(currency, slot.cycle(), *amount).map(|spec| (*slot, spec)))
        .collect()
}

/// Whole units to a provider price spec, in minor units
pub fn price_spec(currency: &str, cycle: BillingCycle, amount: u32) -> BillingResult<PriceSpec> {
    let unit_amount = i64::from(amount)
        .checked_mul(100)
        .filter(|cents| *cents <= MAX_UNIT_AMOUNT)
        .ok_or_else(|| {
            BillingError::InvalidAmount(format!(
                "{} {} exceeds the provider's maximum unit amount",
                amount, currency
            ))
        })?;

    Ok(PriceSpec {
        currency: currency.to_string(),
        unit_amount,
        interval: cycle.interval(),
    })
}

fn insert_prices(book: &mut PriceBook, entry: &SyncEntry, ids: EntryIds) {
    match entry {
        SyncEntry::Plan(id) => {
            let mut prices = ProductPrices {
                product_id: ids.product_id,
                ..Default::default()
            };
            for (slot, price_id) in ids.prices {
                prices.set_price_id(slot.cycle(), price_id);
            }
            book.plans.insert(*id, prices);
        }
        SyncEntry::AddOn(id) => {
            let mut prices = AddOnPrices {
                product_id: ids.product_id,
                ..Default::default()
            };
            for (slot, price_id) in ids.prices {
                prices.set_price_id(slot, price_id);
            }
            book.add_ons.insert(id.clone(), prices);
        }
    }
}

fn find_price<'a>(prices: &'a [RemotePrice], spec: &PriceSpec) -> Option<&'a RemotePrice> {
    prices.iter().find(|price| price.matches(spec))
}

/// Keeps the provider's products and prices in line with a catalog
pub struct CatalogSynchronizer {
    provider: Arc<dyn BillingProvider>,
}

impl CatalogSynchronizer {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    /// Create missing products and prices, update changed descriptions
    ///
    /// A failure on one entry is recorded in the report and the remaining
    /// entries still run. Nothing is rolled back.
    pub async fn sync(&self, catalog: &Catalog) -> BillingResult<SyncReport> {
        let mut products = self.provider.list_active_products().await?;
        let mut report = SyncReport::default();

        for target in entry_targets(catalog) {
            let result = self
                .sync_entry(&catalog.currency, &target, &mut products, &mut report.changes)
                .await;
            match result {
                Ok(ids) => insert_prices(&mut report.prices, &target.entry, ids),
                Err(e) => {
                    tracing::error!(entry = %target.entry, error = %e, "Catalog sync failed for entry");
                    report.failures.push(SyncFailure {
                        entry: target.entry,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            products_created = report.changes.products_created,
            products_updated = report.changes.products_updated,
            prices_created = report.changes.prices_created,
            prices_reused = report.changes.prices_reused,
            failures = report.failures.len(),
            "Catalog sync finished"
        );

        Ok(report)
    }

    async fn sync_entry(
        &self,
        currency: &str,
        target: &EntryTarget<'_>,
        products: &mut Vec<RemoteProduct>,
        changes: &mut SyncChanges,
    ) -> BillingResult<EntryIds> {
        let specs = target_specs(currency, target)?;

        let product = match products.iter().find(|p| p.name == target.name) {
            Some(existing) if existing.description.as_deref() == Some(target.description) => {
                existing.clone()
            }
            Some(existing) => {
                let updated = self
                    .provider
                    .update_product_description(&existing.id, target.description)
                    .await?;
                changes.products_updated += 1;
                tracing::info!(entry = %target.entry, product_id = %updated.id, "Updated product description");
                updated
            }
            None => {
                let created = self
                    .provider
                    .create_product(target.name, target.description)
                    .await?;
                changes.products_created += 1;
                tracing::info!(entry = %target.entry, product_id = %created.id, "Created product");
                products.push(created.clone());
                created
            }
        };

        let mut ids = EntryIds {
            product_id: Some(product.id.clone()),
            ..Default::default()
        };
        if specs.is_empty() {
            return Ok(ids);
        }

        // Prices created this run join the list so equal amounts share one price
        let mut existing = self.provider.list_active_prices(&product.id).await?;
        for (slot, spec) in specs {
            let price_id = match find_price(&existing, &spec) {
                Some(price) => {
                    changes.prices_reused += 1;
                    price.id.clone()
                }
                None => {
                    let created = self.provider.create_price(&product.id, &spec).await?;
                    changes.prices_created += 1;
                    tracing::info!(
                        entry = %target.entry,
                        price_id = %created.id,
                        unit_amount = spec.unit_amount,
                        interval = %spec.interval,
                        "Created price"
                    );
                    let id = created.id.clone();
                    existing.push(created);
                    id
                }
            };
            ids.prices.push((slot, price_id));
        }

        Ok(ids)
    }

    /// Read-only dry run: the ids that already exist and the writes a sync would make
    pub async fn diff(&self, catalog: &Catalog) -> BillingResult<SyncPlan> {
        let products = self.provider.list_active_products().await?;
        let mut plan = SyncPlan::default();

        for target in entry_targets(catalog) {
            let result = self.diff_entry(&catalog.currency, &target, &products).await;
            match result {
                Ok((ids, mut actions)) => {
                    insert_prices(&mut plan.existing, &target.entry, ids);
                    plan.actions.append(&mut actions);
                }
                Err(e) => plan.failures.push(SyncFailure {
                    entry: target.entry,
                    message: e.to_string(),
                }),
            }
        }

        Ok(plan)
    }

    async fn diff_entry(
        &self,
        currency: &str,
        target: &EntryTarget<'_>,
        products: &[RemoteProduct],
    ) -> BillingResult<(EntryIds, Vec<SyncAction>)> {
        let specs = target_specs(currency, target)?;

        let mut actions = Vec::new();
        let mut ids = EntryIds::default();

        let Some(product) = products.iter().find(|p| p.name == target.name) else {
            actions.push(SyncAction::CreateProduct {
                entry: target.entry.clone(),
                name: target.name.to_string(),
            });
            let mut planned: Vec<PriceSpec> = Vec::new();
            for (slot, spec) in specs {
                if planned.contains(&spec) {
                    continue;
                }
                actions.push(SyncAction::CreatePrice {
                    entry: target.entry.clone(),
                    product_id: None,
                    slot,
                    unit_amount: spec.unit_amount,
                });
                planned.push(spec);
            }
            return Ok((ids, actions));
        };

        ids.product_id = Some(product.id.clone());
        if product.description.as_deref() != Some(target.description) {
            actions.push(SyncAction::UpdateDescription {
                entry: target.entry.clone(),
                product_id: product.id.clone(),
            });
        }

        if specs.is_empty() {
            return Ok((ids, actions));
        }

        let existing = self.provider.list_active_prices(&product.id).await?;
        let mut planned: Vec<PriceSpec> = Vec::new();
        for (slot, spec) in specs {
            match find_price(&existing, &spec) {
                Some(price) => ids.prices.push((slot, price.id.clone())),
                None if planned.contains(&spec) => {}
                None => {
                    actions.push(SyncAction::CreatePrice {
                        entry: target.entry.clone(),
                        product_id: Some(product.id.clone()),
                        slot,
                        unit_amount: spec.unit_amount,
                    });
                    planned.push(spec);
                }
            }
        }

        Ok((ids, actions))
    }
}
