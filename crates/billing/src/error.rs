//! Billing error types

use thiserror::Error;

/// Result alias used throughout the billing crate
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by pricing, catalog sync, promotion lookup and checkout
#[derive(Debug, Error)]
pub enum BillingError {
    /// Unknown plan, or a plan without programmatic pricing (Enterprise)
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid billing cycle: {0}")]
    InvalidCycle(String),

    #[error("No code provided")]
    EmptyCode,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A plan or add-on has no remote price id for the requested cycle
    #[error("Plan not priceable: {0}")]
    PlanNotPriceable(String),

    /// Provider credential absent; nothing provider-backed can run
    #[error("Billing provider misconfigured: {0}")]
    MisconfiguredProvider(String),

    /// Coupon string rejected under the fail-closed fallback policy
    #[error("Invalid promotion code: {0}")]
    InvalidPromotion(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Session creation failed at the provider; carries the provider's message
    #[error("{0}")]
    CheckoutProviderError(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used for status mapping and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Authorization,
    Provider,
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::InvalidPlan(_)
            | BillingError::InvalidCycle(_)
            | BillingError::EmptyCode
            | BillingError::InvalidPromotion(_)
            | BillingError::InvalidAmount(_) => ErrorKind::Validation,
            BillingError::PlanNotPriceable(_) | BillingError::MisconfiguredProvider(_) => {
                ErrorKind::Configuration
            }
            BillingError::Unauthorized(_) => ErrorKind::Authorization,
            BillingError::CheckoutProviderError(_)
            | BillingError::StripeApi(_)
            | BillingError::Internal(_) => ErrorKind::Provider,
        }
    }

    /// Re-tag a provider failure raised while creating a checkout session
    pub fn into_checkout_error(self) -> Self {
        match self {
            BillingError::StripeApi(msg) | BillingError::Internal(msg) => {
                BillingError::CheckoutProviderError(msg)
            }
            other => other,
        }
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        match err {
            stripe::StripeError::Stripe(request_error) => BillingError::StripeApi(
                request_error
                    .message
                    .unwrap_or_else(|| format!("Stripe request failed ({})", request_error.http_status)),
            ),
            other => BillingError::StripeApi(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BillingError::InvalidPlan("ENTERPRISE".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(BillingError::EmptyCode.kind(), ErrorKind::Validation);
        assert_eq!(
            BillingError::PlanNotPriceable("PRO (yearly)".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BillingError::MisconfiguredProvider("STRIPE_SECRET_KEY not set".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            BillingError::Unauthorized("no token".into()).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            BillingError::StripeApi("rate limited".into()).kind(),
            ErrorKind::Provider
        );
    }

    #[test]
    fn test_into_checkout_error_keeps_provider_message() {
        let err = BillingError::StripeApi("No such coupon: 'SPRING'".into()).into_checkout_error();
        assert!(matches!(err, BillingError::CheckoutProviderError(ref m) if m == "No such coupon: 'SPRING'"));
        assert_eq!(err.to_string(), "No such coupon: 'SPRING'");

        let err = BillingError::InvalidPlan("X".into()).into_checkout_error();
        assert!(matches!(err, BillingError::InvalidPlan(_)));
    }
}
