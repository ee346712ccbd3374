//! Promotion code lookup
//!
//! Codes are looked up on every attempt, never cached. Expiry and
//! exhaustion are reported for display only; the provider enforces them when
//! the session is created.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, RemoteCoupon, RemotePromotion};

/// Normalized result of a promotion code lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionSummary {
    pub valid: bool,
    /// Canonical code as stored by the provider
    pub code: Option<String>,
    /// Provider id attached to checkout sessions
    pub promotion_id: Option<String>,
    pub discount_description: Option<String>,
    /// Coupon `redeem_by` as YYYY-MM-DD (UTC)
    pub expires_on: Option<String>,
    pub times_redeemed: Option<i64>,
    pub max_redemptions: Option<i64>,
    pub expired: bool,
    pub exhausted: bool,
}

impl PromotionSummary {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Human-readable discount, percentage first
pub fn describe_discount(coupon: &RemoteCoupon) -> String {
    if let Some(percent) = coupon.percent_off {
        if percent.fract() == 0.0 {
            format!("{:.0}% off", percent)
        } else {
            format!("{}% off", percent)
        }
    } else if let Some(cents) = coupon.amount_off {
        format!("${}.{:02} off", cents / 100, (cents % 100).abs())
    } else {
        "Valid coupon".to_string()
    }
}

fn format_date(timestamp: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .map(|at| at.date().to_string())
}

fn summarize(promotion: RemotePromotion, now: OffsetDateTime) -> PromotionSummary {
    let exhausted = match (promotion.times_redeemed, promotion.max_redemptions) {
        (Some(redeemed), Some(max)) => redeemed >= max,
        _ => false,
    };

    let mut summary = PromotionSummary {
        valid: true,
        code: Some(promotion.code),
        promotion_id: Some(promotion.id),
        times_redeemed: promotion.times_redeemed,
        max_redemptions: promotion.max_redemptions,
        exhausted,
        ..Default::default()
    };

    match promotion.coupon {
        Some(coupon) => {
            summary.discount_description = Some(describe_discount(&coupon));
            if let Some(redeem_by) = coupon.redeem_by {
                summary.expires_on = format_date(redeem_by);
                summary.expired = redeem_by < now.unix_timestamp();
            }
        }
        None => summary.discount_description = Some("Valid promotion code".to_string()),
    }

    summary
}

/// Resolves user-entered promotion codes against the provider
pub struct PromotionResolver {
    provider: Arc<dyn BillingProvider>,
}

impl PromotionResolver {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    pub async fn resolve(&self, code: &str) -> BillingResult<PromotionSummary> {
        self.resolve_at(code, OffsetDateTime::now_utc()).await
    }

    /// Resolve with an explicit clock for the expiry flag
    ///
    /// The code is matched exactly as given. No match is a normal result
    /// with `valid: false`.
    pub async fn resolve_at(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> BillingResult<PromotionSummary> {
        if code.trim().is_empty() {
            return Err(BillingError::EmptyCode);
        }

        match self.provider.find_promotion_code(code).await? {
            Some(promotion) => {
                let summary = summarize(promotion, now);
                tracing::debug!(
                    code = %code,
                    expired = summary.expired,
                    exhausted = summary.exhausted,
                    "Promotion code resolved"
                );
                Ok(summary)
            }
            None => {
                tracing::debug!(code = %code, "Promotion code not found");
                Ok(PromotionSummary::not_found())
            }
        }
    }
}
