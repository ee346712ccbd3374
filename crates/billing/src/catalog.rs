//! Plan and add-on catalog
//!
//! The catalog is compiled-in configuration. It is passed explicitly into the
//! price resolver and the synchronizer so tests can substitute their own.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult};

/// Subscription plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanId {
    Essentials,
    Pro,
    Enterprise,
}

impl PlanId {
    pub const ALL: [PlanId; 3] = [PlanId::Essentials, PlanId::Pro, PlanId::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Essentials => "ESSENTIALS",
            PlanId::Pro => "PRO",
            PlanId::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = BillingError;

    /// Plan ids are matched exactly as the storefront sends them
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ESSENTIALS" => Ok(PlanId::Essentials),
            "PRO" => Ok(PlanId::Pro),
            "ENTERPRISE" => Ok(PlanId::Enterprise),
            other => Err(BillingError::InvalidPlan(other.to_string())),
        }
    }
}

/// Billing cycle for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub const ALL: [BillingCycle; 2] = [BillingCycle::Monthly, BillingCycle::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Recurring interval this cycle maps to at the provider
    pub fn interval(&self) -> RecurringInterval {
        match self {
            BillingCycle::Monthly => RecurringInterval::Month,
            BillingCycle::Yearly => RecurringInterval::Year,
        }
    }

    /// Amount charged per cycle for a monthly base amount
    ///
    /// Yearly is twelve months less the discount, rounded half away from zero.
    pub fn amount_for(&self, monthly: u32, discount_rate: f64) -> u32 {
        match self {
            BillingCycle::Monthly => monthly,
            BillingCycle::Yearly => yearly_amount(monthly, discount_rate),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(BillingError::InvalidCycle(other.to_string())),
        }
    }
}

/// Recurring interval of a remote price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringInterval {
    Month,
    Year,
}

impl RecurringInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringInterval::Month => "month",
            RecurringInterval::Year => "year",
        }
    }
}

impl fmt::Display for RecurringInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// round(monthly * 12 * (1 - discount)); f64::round rounds half away from zero
pub fn yearly_amount(monthly: u32, discount_rate: f64) -> u32 {
    let yearly = (f64::from(monthly) * 12.0 * (1.0 - discount_rate)).round();
    yearly.max(0.0) as u32
}

/// Whole-percent savings shown next to the yearly toggle
pub fn savings_percent(discount_rate: f64) -> u32 {
    (discount_rate * 100.0).round().max(0.0) as u32
}

/// A subscription tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub id: PlanId,
    /// Display name, also the natural key of the remote product
    pub name: String,
    pub description: String,
    /// Base monthly amount in whole dollars; `None` means sales-quoted
    pub monthly: Option<u32>,
    /// Fraction in [0, 1)
    pub yearly_discount: f64,
    pub popular: bool,
    pub features: Vec<String>,
}

impl Plan {
    pub fn is_priced(&self) -> bool {
        self.monthly.is_some()
    }

    /// Per-cycle amount, `None` for sales-quoted plans
    pub fn amount_for(&self, cycle: BillingCycle) -> Option<u32> {
        self.monthly
            .map(|monthly| cycle.amount_for(monthly, self.yearly_discount))
    }
}

/// An optional per-truck capability layered on a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOn {
    /// Stable short key, e.g. "city"
    pub id: String,
    /// Display title, also the natural key of the remote product
    pub title: String,
    pub description: String,
    pub monthly: u32,
}

/// The full set of plans and add-ons
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    pub currency: String,
    pub plans: Vec<Plan>,
    pub add_ons: Vec<AddOn>,
}

impl Catalog {
    pub fn plan(&self, id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn add_on(&self, id: &str) -> Option<&AddOn> {
        self.add_ons.iter().find(|a| a.id == id)
    }

    pub fn popular_plan(&self) -> Option<&Plan> {
        self.plans.iter().find(|p| p.popular)
    }

    /// Plans with programmatic pricing, in catalog order
    pub fn priced_plans(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter().filter(|p| p.is_priced())
    }

    /// Check the catalog invariants
    pub fn validate(&self) -> BillingResult<()> {
        let popular = self.plans.iter().filter(|p| p.popular).count();
        if popular != 1 {
            return Err(BillingError::Internal(format!(
                "catalog must mark exactly one popular plan, found {}",
                popular
            )));
        }

        let mut plan_ids = HashSet::new();
        for plan in &self.plans {
            if !plan_ids.insert(plan.id) {
                return Err(BillingError::Internal(format!("duplicate plan {}", plan.id)));
            }
            if !(0.0..1.0).contains(&plan.yearly_discount) {
                return Err(BillingError::Internal(format!(
                    "plan {} has yearly discount {} outside [0, 1)",
                    plan.id, plan.yearly_discount
                )));
            }
            if plan.id == PlanId::Enterprise && plan.monthly.is_some() {
                return Err(BillingError::Internal(
                    "ENTERPRISE must not carry a base amount".to_string(),
                ));
            }
        }

        let mut add_on_ids = HashSet::new();
        for add_on in &self.add_ons {
            if !add_on_ids.insert(add_on.id.as_str()) {
                return Err(BillingError::Internal(format!(
                    "duplicate add-on key {}",
                    add_on.id
                )));
            }
        }

        // Product names are the remote natural key
        let mut names = HashSet::new();
        let all_names = self
            .plans
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.add_ons.iter().map(|a| a.title.as_str()));
        for name in all_names {
            if !names.insert(name) {
                return Err(BillingError::Internal(format!(
                    "duplicate product name {}",
                    name
                )));
            }
        }

        Ok(())
    }

    /// The storefront's built-in catalog (USD, per truck)
    pub fn builtin() -> Self {
        fn features(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        fn add_on(id: &str, title: &str, description: &str, monthly: u32) -> AddOn {
            AddOn {
                id: id.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                monthly,
            }
        }

        Self {
            currency: "usd".to_string(),
            plans: vec![
                Plan {
                    id: PlanId::Essentials,
                    name: "ESSENTIALS".to_string(),
                    description:
                        "Stop drowning in emails. We organize your loads, you close the deals."
                            .to_string(),
                    monthly: Some(49),
                    yearly_discount: 0.15,
                    popular: false,
                    features: features(&[
                        "Smart Email Reader (Reads & adds load emails automatically)",
                        "Load Profit Checker (Shows which loads pay best)",
                        "Live Dispatch Dashboard (No more spreadsheets)",
                        "1-Click Broker Reply (Send offers in seconds)",
                        "Standard Email Support",
                    ]),
                },
                Plan {
                    id: PlanId::Pro,
                    name: "PRO".to_string(),
                    description: "Get a 360°, real-time view of your operations.".to_string(),
                    monthly: Some(79),
                    yearly_discount: 0.22,
                    popular: true,
                    features: features(&[
                        "Everything in ESSENTIALS, PLUS:",
                        "Smart Driver Matching (AI matches loads to drivers)",
                        "Hot Load Alerts (High-profit load pings)",
                        "Live ELD Integration (Samsara)",
                        "Auto-Book Trusted Brokers",
                        "Advanced Analytics Dashboard",
                    ]),
                },
                Plan {
                    id: PlanId::Enterprise,
                    name: "ENTERPRISE".to_string(),
                    description: "Your complete, AI-powered dispatch department.".to_string(),
                    monthly: None,
                    yearly_discount: 0.0,
                    popular: false,
                    features: features(&[
                        "Everything in PRO, PLUS:",
                        "Advanced Route Optimizer (Profitable triangle loads)",
                        "Proactive Problem Solver (Trailer swap suggestions)",
                        "Multi-User Roles & Permissions",
                        "Dedicated Account Manager & 24/7 Priority Support",
                    ]),
                },
            ],
            add_ons: vec![
                add_on(
                    "city",
                    "City Dispatch Maestro",
                    "Plans all your city pickups & deliveries automatically.",
                    15,
                ),
                add_on(
                    "highway",
                    "Highway Chess Master",
                    "Unlocks \u{201c}Grandmaster AI\u{201d}: Triangle Load Hunter, HOS-Aware Scheduling, In-Transit Load Swap suggestions.",
                    20,
                ),
                add_on(
                    "bestfinder",
                    "Best Load Finder",
                    "Finds and pins the most profitable loads across boards automatically.",
                    15,
                ),
                add_on(
                    "safety",
                    "AI Safety Supervisor",
                    "Alerts for overspeeding or harsh braking.",
                    10,
                ),
                add_on(
                    "cb",
                    "Cross-Border Compliance",
                    "Files ACE/ACI e-Manifests automatically.",
                    20,
                ),
                add_on(
                    "voice",
                    "24/7 Voice & SMS Assistant",
                    "AI assistant that talks to brokers & drivers.",
                    10,
                ),
                add_on(
                    "agent",
                    "Personalized AI Agent",
                    "Builds personal relationships with your top brokers.",
                    15,
                ),
                add_on(
                    "pay",
                    "Finance & Admin: Automated Invoicing & Payroll",
                    "Unlocks the CLERK agent to automate invoicing and generate payroll-ready reports.",
                    15,
                ),
                add_on(
                    "score",
                    "Broker Scorecard & Risk Alerts",
                    "Credit/OTR risk signals & fraud prevention alerts on broker profiles.",
                    10,
                ),
            ],
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
