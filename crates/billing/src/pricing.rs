//! Price resolution
//!
//! Turns a plan, billing cycle and add-on selection into line items and a
//! total. Resolution never touches the network, so the checkout builder
//! re-runs it server-side instead of trusting amounts shown in the browser.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{BillingCycle, Catalog, PlanId};
use crate::error::{BillingError, BillingResult};
use crate::price_book::PriceBook;

/// What a line item charges for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum LineItemKind {
    Plan(PlanId),
    AddOn(String),
}

/// One priced line of a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub kind: LineItemKind,
    /// Remote price id, `None` when the price book has no entry for this cycle
    pub price_ref: Option<String>,
    pub quantity: u64,
    /// Whole currency units per cycle
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOnAmount {
    pub id: String,
    pub amount: u32,
}

/// Result of resolving a selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub plan: PlanId,
    pub cycle: BillingCycle,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub plan_amount: u32,
    pub add_on_amounts: Vec<AddOnAmount>,
    pub total: u32,
}

/// Resolves selections against a catalog and a price book
#[derive(Debug, Clone)]
pub struct PriceResolver {
    catalog: Arc<Catalog>,
    prices: PriceBook,
}

impl PriceResolver {
    pub fn new(catalog: Arc<Catalog>, prices: PriceBook) -> Self {
        Self { catalog, prices }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// Resolve raw identifiers as received from a caller
    pub fn resolve<S: AsRef<str>>(
        &self,
        plan_id: &str,
        cycle: &str,
        add_on_ids: &[S],
    ) -> BillingResult<PriceQuote> {
        let plan: PlanId = plan_id.parse()?;
        let cycle: BillingCycle = cycle.parse()?;
        self.quote(plan, cycle, add_on_ids)
    }

    /// Resolve a typed selection
    ///
    /// Unknown add-on keys are dropped; duplicates count once. Add-ons are
    /// listed in catalog order and priced with the plan's yearly discount.
    pub fn quote<S: AsRef<str>>(
        &self,
        plan_id: PlanId,
        cycle: BillingCycle,
        add_on_ids: &[S],
    ) -> BillingResult<PriceQuote> {
        let plan = self
            .catalog
            .plan(plan_id)
            .ok_or_else(|| BillingError::InvalidPlan(plan_id.to_string()))?;

        let plan_amount = plan.amount_for(cycle).ok_or_else(|| {
            BillingError::InvalidPlan(format!("{} uses custom pricing", plan_id))
        })?;

        let selected: HashSet<&str> = add_on_ids.iter().map(|id| id.as_ref()).collect();

        let mut line_items = vec![LineItem {
            kind: LineItemKind::Plan(plan_id),
            price_ref: self.prices.plan_price(plan_id, cycle).map(String::from),
            quantity: 1,
            amount: plan_amount,
        }];
        let mut add_on_amounts = Vec::new();
        let mut total = plan_amount;

        for add_on in self
            .catalog
            .add_ons
            .iter()
            .filter(|a| selected.contains(a.id.as_str()))
        {
            let amount = cycle.amount_for(add_on.monthly, plan.yearly_discount);
            total = total.checked_add(amount).ok_or_else(|| {
                BillingError::InvalidAmount(format!("total overflow adding {}", add_on.id))
            })?;

            line_items.push(LineItem {
                kind: LineItemKind::AddOn(add_on.id.clone()),
                price_ref: self
                    .prices
                    .add_on_price(&add_on.id, plan_id, cycle)
                    .map(String::from),
                quantity: 1,
                amount,
            });
            add_on_amounts.push(AddOnAmount {
                id: add_on.id.clone(),
                amount,
            });
        }

        Ok(PriceQuote {
            plan: plan_id,
            cycle,
            currency: self.catalog.currency.clone(),
            line_items,
            plan_amount,
            add_on_amounts,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_book::{AddOnPrices, PriceSlot, ProductPrices};

    fn resolver() -> PriceResolver {
        PriceResolver::new(Arc::new(Catalog::builtin()), PriceBook::new())
    }

    #[test]
    fn test_pro_yearly_plan_amount() {
        let quote = resolver().resolve::<&str>("PRO", "yearly", &[]).unwrap();
        assert_eq!(quote.plan_amount, 739);
        assert_eq!(quote.total, 739);
        assert_eq!(quote.line_items.len(), 1);
    }

    #[test]
    fn test_monthly_total_sums_add_ons() {
        let quote = resolver()
            .resolve("ESSENTIALS", "monthly", &["city", "highway"])
            .unwrap();
        assert_eq!(quote.plan_amount, 49);
        assert_eq!(
            quote.add_on_amounts,
            vec![
                AddOnAmount { id: "city".into(), amount: 15 },
                AddOnAmount { id: "highway".into(), amount: 20 },
            ]
        );
        assert_eq!(quote.total, 84);
    }

    #[test]
    fn test_yearly_add_ons_use_plan_discount() {
        let quote = resolver().resolve("PRO", "yearly", &["city", "safety"]).unwrap();
        // city: 15 * 12 * 0.78 = 140.4, safety: 10 * 12 * 0.78 = 93.6
        assert_eq!(
            quote.add_on_amounts,
            vec![
                AddOnAmount { id: "city".into(), amount: 140 },
                AddOnAmount { id: "safety".into(), amount: 94 },
            ]
        );
        assert_eq!(quote.total, 739 + 140 + 94);

        // Same add-on under ESSENTIALS uses 15%: 15 * 12 * 0.85 = 153
        let quote = resolver().resolve("ESSENTIALS", "yearly", &["city"]).unwrap();
        assert_eq!(quote.add_on_amounts[0].amount, 153);
    }

    #[test]
    fn test_unknown_add_ons_are_dropped() {
        let with_unknown = resolver()
            .resolve("PRO", "monthly", &["city", "doesnotexist"])
            .unwrap();
        let without = resolver().resolve("PRO", "monthly", &["city"]).unwrap();
        assert_eq!(with_unknown.total, without.total);
        assert_eq!(with_unknown.line_items, without.line_items);
    }

    #[test]
    fn test_duplicate_add_ons_count_once() {
        let quote = resolver()
            .resolve("PRO", "monthly", &["city", "city"])
            .unwrap();
        assert_eq!(quote.total, 79 + 15);
    }

    #[test]
    fn test_add_on_order_follows_catalog() {
        let a = resolver().resolve("PRO", "monthly", &["score", "city"]).unwrap();
        let b = resolver().resolve("PRO", "monthly", &["city", "score"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.add_on_amounts[0].id, "city");
    }

    #[test]
    fn test_enterprise_is_invalid_plan() {
        let err = resolver().resolve::<&str>("ENTERPRISE", "monthly", &[]).unwrap_err();
        assert!(matches!(err, BillingError::InvalidPlan(_)));
    }

    #[test]
    fn test_unknown_plan_and_cycle() {
        assert!(matches!(
            resolver().resolve::<&str>("TEAM", "monthly", &[]),
            Err(BillingError::InvalidPlan(_))
        ));
        assert!(matches!(
            resolver().resolve::<&str>("PRO", "weekly", &[]),
            Err(BillingError::InvalidCycle(_))
        ));
    }

    #[test]
    fn test_price_refs_come_from_price_book() {
        let mut prices = PriceBook::new();
        prices.plans.insert(
            PlanId::Pro,
            ProductPrices {
                product_id: None,
                monthly_price_id: Some("price_pro_m".into()),
                yearly_price_id: None,
            },
        );
        let mut city = AddOnPrices::default();
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Pro), "price_city_y_pro".into());
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Essentials), "price_city_y_ess".into());
        prices.add_ons.insert("city".into(), city);
        let resolver = PriceResolver::new(Arc::new(Catalog::builtin()), prices);

        let monthly = resolver.resolve("PRO", "monthly", &["city"]).unwrap();
        assert_eq!(monthly.line_items[0].price_ref.as_deref(), Some("price_pro_m"));
        assert_eq!(monthly.line_items[1].price_ref, None);

        let yearly = resolver.resolve("PRO", "yearly", &["city"]).unwrap();
        assert_eq!(yearly.line_items[0].price_ref, None);
        assert_eq!(yearly.line_items[1].price_ref.as_deref(), Some("price_city_y_pro"));

        // Same add-on, other plan's discount, other price
        let yearly = resolver.resolve("ESSENTIALS", "yearly", &["city"]).unwrap();
        assert_eq!(yearly.line_items[1].price_ref.as_deref(), Some("price_city_y_ess"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        let first = r.resolve("PRO", "yearly", &["highway", "voice"]).unwrap();
        for _ in 0..10 {
            assert_eq!(r.resolve("PRO", "yearly", &["highway", "voice"]).unwrap(), first);
        }
    }

    #[test]
    fn test_custom_catalog_substitution() {
        let mut catalog = Catalog::builtin();
        catalog.add_ons.retain(|a| a.id == "city");
        catalog.add_ons[0].monthly = 100;
        let resolver = PriceResolver::new(Arc::new(catalog), PriceBook::new());

        let quote = resolver.resolve("PRO", "monthly", &["city", "highway"]).unwrap();
        assert_eq!(quote.total, 179);
    }
}
