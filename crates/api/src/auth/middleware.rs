//! Supabase credential verification for checkout

use async_trait::async_trait;
use autodispatch_billing::{BillingError, BillingResult, CallerVerifier, VerifiedCaller};
use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Cookie set by the storefront's Supabase session helper
pub const AUTH_COOKIE: &str = "sb-access-token";

/// Audience Supabase stamps on user access tokens
const SUPABASE_AUDIENCE: &str = "authenticated";

/// Claims carried by a Supabase access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: u64,
}

/// Response from Supabase /auth/v1/user endpoint
#[derive(Debug, Clone, Deserialize)]
struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication is not configured")]
    NotConfigured,
}

impl From<AuthError> for BillingError {
    fn from(err: AuthError) -> Self {
        BillingError::Unauthorized(err.to_string())
    }
}

/// Extract the access token from the `sb-access-token` cookie
fn extract_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            for cookie in cookies.split(';') {
                let cookie = cookie.trim();
                let value = cookie
                    .strip_prefix(AUTH_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='));
                if let Some(token) = value {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
            None
        })
}

/// Extract bearer token from Authorization header or session cookie
/// Prefers the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    extract_token_from_cookie(headers)
}

/// Verifies Supabase access tokens, locally when the JWT secret is known
/// and through the Supabase Auth API otherwise
#[derive(Clone)]
pub struct SupabaseVerifier {
    supabase_url: String,
    supabase_anon_key: String,
    jwt_secret: Option<String>,
    http_client: Client,
}

impl SupabaseVerifier {
    pub fn new(
        supabase_url: impl Into<String>,
        supabase_anon_key: impl Into<String>,
        jwt_secret: Option<String>,
    ) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            supabase_anon_key: supabase_anon_key.into(),
            jwt_secret,
            http_client: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.supabase_jwt_secret.is_none()
            && (config.supabase_url.is_empty() || config.supabase_anon_key.is_empty())
        {
            tracing::warn!("Supabase auth not configured; checkout will reject every caller");
        }
        Self::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            config.supabase_jwt_secret.clone(),
        )
    }

    /// Verify an access token and return the caller it belongs to
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedCaller, AuthError> {
        match &self.jwt_secret {
            Some(secret) => verify_locally(secret, token),
            None => self.verify_via_api(token).await,
        }
    }

    /// Verify a Supabase token by calling the Supabase Auth API
    async fn verify_via_api(&self, token: &str) -> Result<VerifiedCaller, AuthError> {
        if self.supabase_url.is_empty() || self.supabase_anon_key.is_empty() {
            tracing::warn!("Supabase URL or anon key not configured, cannot verify token via API");
            return Err(AuthError::NotConfigured);
        }

        let url = format!("{}/auth/v1/user", self.supabase_url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.supabase_anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to verify Supabase token: {}", e);
                AuthError::InvalidToken
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                "Supabase token verification failed with status: {}",
                response.status()
            );
            return Err(AuthError::InvalidToken);
        }

        let user = response
            .json::<SupabaseUserResponse>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(VerifiedCaller {
            user_id: user.id,
            email: user.email,
        })
    }
}

fn verify_locally(secret: &str, token: &str) -> Result<VerifiedCaller, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[SUPABASE_AUDIENCE]);

    let key = DecodingKey::from_secret(secret.as_bytes());
    let data = jsonwebtoken::decode::<SupabaseClaims>(token, &key, &validation).map_err(|e| {
        tracing::warn!(error = %e, "Supabase JWT rejected");
        AuthError::InvalidToken
    })?;

    if data.claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(VerifiedCaller {
        user_id: data.claims.sub,
        email: data.claims.email,
    })
}

#[async_trait]
impl CallerVerifier for SupabaseVerifier {
    async fn verify(&self, credential: Option<&str>) -> BillingResult<VerifiedCaller> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::warn!("Checkout attempted without credentials");
                AuthError::MissingAuth
            })?;

        let caller = self.verify_token(token).await?;
        tracing::debug!(user_id = %caller.user_id, "Caller verified");
        Ok(caller)
    }
}
