//! Remote price identifiers for each catalog entry
//!
//! A `PriceBook` is either read from the environment (`PRICE_PRO_MONTHLY`,
//! `PRICE_ADDON_CITY_YEARLY_ESSENTIALS`, ...) or produced by a catalog sync.
//! It is immutable once loaded.
//!
//! Add-ons are discounted at the selected plan's yearly rate, so each add-on
//! carries one yearly price per priced plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{BillingCycle, Catalog, PlanId};

/// Where a remote price id lives in the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSlot {
    /// Plan price for a cycle, or an add-on's monthly price
    Cycle(BillingCycle),
    /// Add-on yearly price at one plan's discount
    YearlyFor(PlanId),
}

impl PriceSlot {
    pub fn cycle(&self) -> BillingCycle {
        match self {
            PriceSlot::Cycle(cycle) => *cycle,
            PriceSlot::YearlyFor(_) => BillingCycle::Yearly,
        }
    }
}

/// Product and per-cycle price ids for one plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub monthly_price_id: Option<String>,
    pub yearly_price_id: Option<String>,
}

impl ProductPrices {
    pub fn price_id(&self, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.monthly_price_id.as_deref(),
            BillingCycle::Yearly => self.yearly_price_id.as_deref(),
        }
    }

    pub fn set_price_id(&mut self, cycle: BillingCycle, price_id: String) {
        match cycle {
            BillingCycle::Monthly => self.monthly_price_id = Some(price_id),
            BillingCycle::Yearly => self.yearly_price_id = Some(price_id),
        }
    }

    fn is_empty(&self) -> bool {
        self.product_id.is_none() && self.monthly_price_id.is_none() && self.yearly_price_id.is_none()
    }
}

/// Product, monthly price and per-plan yearly price ids for one add-on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnPrices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub monthly_price_id: Option<String>,
    #[serde(default)]
    pub yearly_price_ids: BTreeMap<PlanId, String>,
}

impl AddOnPrices {
    /// Price id charged when the add-on rides on `plan`
    pub fn price_id(&self, plan: PlanId, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.monthly_price_id.as_deref(),
            BillingCycle::Yearly => self.yearly_price_ids.get(&plan).map(String::as_str),
        }
    }

    /// A `Cycle(Yearly)` slot names no plan and is ignored
    pub fn set_price_id(&mut self, slot: PriceSlot, price_id: String) {
        match slot {
            PriceSlot::Cycle(BillingCycle::Monthly) => self.monthly_price_id = Some(price_id),
            PriceSlot::Cycle(BillingCycle::Yearly) => {}
            PriceSlot::YearlyFor(plan) => {
                self.yearly_price_ids.insert(plan, price_id);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.product_id.is_none()
            && self.monthly_price_id.is_none()
            && self.yearly_price_ids.is_empty()
    }
}

/// Server-held map from catalog entry to remote price ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBook {
    pub plans: BTreeMap<PlanId, ProductPrices>,
    pub add_ons: BTreeMap<String, AddOnPrices>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_price(&self, plan: PlanId, cycle: BillingCycle) -> Option<&str> {
        self.plans.get(&plan).and_then(|p| p.price_id(cycle))
    }

    /// Price id for an add-on selected alongside `plan`
    pub fn add_on_price(&self, add_on: &str, plan: PlanId, cycle: BillingCycle) -> Option<&str> {
        self.add_ons.get(add_on).and_then(|p| p.price_id(plan, cycle))
    }

    /// Environment variable holding a plan's price id
    pub fn plan_env_key(plan: PlanId, cycle: BillingCycle) -> String {
        format!(
            "PRICE_{}_{}",
            plan.as_str(),
            cycle.as_str().to_ascii_uppercase()
        )
    }

    /// Environment variable holding an add-on's price id for a slot
    pub fn add_on_env_key(add_on: &str, slot: PriceSlot) -> String {
        let add_on = add_on.to_ascii_uppercase();
        match slot {
            PriceSlot::Cycle(cycle) => format!(
                "PRICE_ADDON_{}_{}",
                add_on,
                cycle.as_str().to_ascii_uppercase()
            ),
            PriceSlot::YearlyFor(plan) => format!("PRICE_ADDON_{}_YEARLY_{}", add_on, plan.as_str()),
        }
    }

    /// Build from a key lookup; blank values count as unset
    pub fn from_lookup<F>(catalog: &Catalog, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: String| lookup(key.as_str()).filter(|v| !v.trim().is_empty());
        let mut book = PriceBook::new();

        for plan in catalog.priced_plans() {
            let prices = ProductPrices {
                product_id: None,
                monthly_price_id: read(Self::plan_env_key(plan.id, BillingCycle::Monthly)),
                yearly_price_id: read(Self::plan_env_key(plan.id, BillingCycle::Yearly)),
            };
            if !prices.is_empty() {
                book.plans.insert(plan.id, prices);
            }
        }

        for add_on in &catalog.add_ons {
            let mut prices = AddOnPrices {
                monthly_price_id: read(Self::add_on_env_key(
                    &add_on.id,
                    PriceSlot::Cycle(BillingCycle::Monthly),
                )),
                ..Default::default()
            };
            for plan in catalog.priced_plans() {
                let slot = PriceSlot::YearlyFor(plan.id);
                if let Some(id) = read(Self::add_on_env_key(&add_on.id, slot)) {
                    prices.set_price_id(slot, id);
                }
            }
            if !prices.is_empty() {
                book.add_ons.insert(add_on.id.clone(), prices);
            }
        }

        book
    }

    /// `KEY=value` lines for every configured price
    pub fn to_env_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (plan, prices) in &self.plans {
            for cycle in BillingCycle::ALL {
                if let Some(id) = prices.price_id(cycle) {
                    lines.push(format!("{}={}", Self::plan_env_key(*plan, cycle), id));
                }
            }
        }
        for (add_on, prices) in &self.add_ons {
            if let Some(id) = &prices.monthly_price_id {
                let key = Self::add_on_env_key(add_on, PriceSlot::Cycle(BillingCycle::Monthly));
                lines.push(format!("{}={}", key, id));
            }
            for (plan, id) in &prices.yearly_price_ids {
                let key = Self::add_on_env_key(add_on, PriceSlot::YearlyFor(*plan));
                lines.push(format!("{}={}", key, id));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_key_names() {
        assert_eq!(
            PriceBook::plan_env_key(PlanId::Essentials, BillingCycle::Monthly),
            "PRICE_ESSENTIALS_MONTHLY"
        );
        assert_eq!(
            PriceBook::add_on_env_key("bestfinder", PriceSlot::Cycle(BillingCycle::Monthly)),
            "PRICE_ADDON_BESTFINDER_MONTHLY"
        );
        assert_eq!(
            PriceBook::add_on_env_key("city", PriceSlot::YearlyFor(PlanId::Essentials)),
            "PRICE_ADDON_CITY_YEARLY_ESSENTIALS"
        );
    }

    #[test]
    fn test_from_lookup_reads_plans_and_add_ons() {
        let catalog = Catalog::builtin();
        let book = PriceBook::from_lookup(
            &catalog,
            lookup_from(&[
                ("PRICE_PRO_MONTHLY", "price_pro_m"),
                ("PRICE_PRO_YEARLY", "price_pro_y"),
                ("PRICE_ADDON_CITY_MONTHLY", "price_city_m"),
                ("PRICE_ADDON_CITY_YEARLY_PRO", "price_city_y_pro"),
                ("PRICE_ESSENTIALS_YEARLY", "   "),
            ]),
        );

        assert_eq!(book.plan_price(PlanId::Pro, BillingCycle::Monthly), Some("price_pro_m"));
        assert_eq!(book.plan_price(PlanId::Pro, BillingCycle::Yearly), Some("price_pro_y"));
        // Blank values are treated as unset
        assert_eq!(book.plan_price(PlanId::Essentials, BillingCycle::Yearly), None);
        assert!(!book.plans.contains_key(&PlanId::Essentials));
        assert_eq!(
            book.add_on_price("city", PlanId::Essentials, BillingCycle::Monthly),
            Some("price_city_m")
        );
        assert_eq!(
            book.add_on_price("city", PlanId::Pro, BillingCycle::Yearly),
            Some("price_city_y_pro")
        );
        assert_eq!(book.add_on_price("city", PlanId::Essentials, BillingCycle::Yearly), None);
        assert_eq!(book.add_on_price("highway", PlanId::Pro, BillingCycle::Monthly), None);
    }

    #[test]
    fn test_unscoped_add_on_yearly_key_is_ignored() {
        let book = PriceBook::from_lookup(
            &Catalog::builtin(),
            lookup_from(&[("PRICE_ADDON_CITY_YEARLY", "price_city_y")]),
        );
        assert!(book.add_ons.is_empty());
    }

    #[test]
    fn test_enterprise_has_no_env_keys() {
        let catalog = Catalog::builtin();
        let book = PriceBook::from_lookup(
            &catalog,
            lookup_from(&[
                ("PRICE_ENTERPRISE_MONTHLY", "price_ent"),
                ("PRICE_ADDON_CITY_YEARLY_ENTERPRISE", "price_city_ent"),
            ]),
        );
        assert!(book.plans.is_empty());
        assert!(book.add_ons.is_empty());
    }

    #[test]
    fn test_to_env_lines() {
        let mut book = PriceBook::new();
        book.plans.insert(
            PlanId::Pro,
            ProductPrices {
                product_id: Some("prod_1".into()),
                monthly_price_id: Some("price_m".into()),
                yearly_price_id: Some("price_y".into()),
            },
        );
        let mut city = AddOnPrices {
            product_id: Some("prod_2".into()),
            ..Default::default()
        };
        city.set_price_id(PriceSlot::Cycle(BillingCycle::Monthly), "price_cm".into());
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Pro), "price_cy_pro".into());
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Essentials), "price_cy_ess".into());
        book.add_ons.insert("city".into(), city);

        assert_eq!(
            book.to_env_lines(),
            vec![
                "PRICE_PRO_MONTHLY=price_m".to_string(),
                "PRICE_PRO_YEARLY=price_y".to_string(),
                "PRICE_ADDON_CITY_MONTHLY=price_cm".to_string(),
                "PRICE_ADDON_CITY_YEARLY_ESSENTIALS=price_cy_ess".to_string(),
                "PRICE_ADDON_CITY_YEARLY_PRO=price_cy_pro".to_string(),
            ]
        );
    }

    #[test]
    fn test_env_lines_read_back_into_the_same_book() {
        let mut book = PriceBook::new();
        let mut city = AddOnPrices::default();
        city.set_price_id(PriceSlot::Cycle(BillingCycle::Monthly), "price_cm".into());
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Essentials), "price_cy_ess".into());
        book.add_ons.insert("city".into(), city);

        let lines = book.to_env_lines();
        let pairs: Vec<(&str, &str)> = lines.iter().filter_map(|l| l.split_once('=')).collect();
        let reread = PriceBook::from_lookup(&Catalog::builtin(), lookup_from(&pairs));
        assert_eq!(reread, book);
    }

    #[test]
    fn test_price_book_json_uses_plan_names_as_keys() {
        let mut book = PriceBook::new();
        book.plans.insert(PlanId::Essentials, ProductPrices::default());
        let mut city = AddOnPrices::default();
        city.set_price_id(PriceSlot::YearlyFor(PlanId::Pro), "price_cy".into());
        book.add_ons.insert("city".into(), city);

        let json = serde_json::to_value(&book).unwrap();
        assert!(json["plans"].get("ESSENTIALS").is_some());
        assert_eq!(json["add_ons"]["city"]["yearly_price_ids"]["PRO"], "price_cy");
    }
}
