//! Unit tests for Supabase credential verification
//!
//! Tests cover:
//! - Token extraction (header, cookie, precedence)
//! - Local HS256 verification (valid, expired, wrong audience, wrong secret)
//! - Remote verification against a mocked Supabase Auth API

#[cfg(test)]
mod tests {
    use super::super::middleware::*;
    use autodispatch_billing::{BillingError, CallerVerifier};
    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{EncodingKey, Header};

    const SECRET: &str = "test-jwt-secret-key-for-testing-only";

    fn sign(secret: &str, aud: &str, exp_offset: i64) -> String {
        let now = jsonwebtoken::get_current_timestamp() as i64;
        let claims = SupabaseClaims {
            sub: "9b2c4f7e-user".to_string(),
            email: Some("owner@fleet.example".to_string()),
            aud: aud.to_string(),
            exp: (now + exp_offset) as u64,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_bearer_from_header() {
        let map = headers(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(extract_bearer_token(&map).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_falls_back_to_cookie() {
        let map = headers(&[("cookie", "theme=dark; sb-access-token=tok123; other=1")]);
        assert_eq!(extract_bearer_token(&map).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let map = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "sb-access-token=from-cookie"),
        ]);
        assert_eq!(extract_bearer_token(&map).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_non_bearer_schemes_are_ignored() {
        let map = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_bearer_token(&map), None);
        let map = headers(&[("authorization", "Bearer ")]);
        assert_eq!(extract_bearer_token(&map), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_local_verification_accepts_valid_token() {
        let verifier = SupabaseVerifier::new("", "", Some(SECRET.to_string()));
        let caller = verifier
            .verify(Some(sign(SECRET, "authenticated", 3600).as_str()))
            .await
            .unwrap();
        assert_eq!(caller.user_id, "9b2c4f7e-user");
        assert_eq!(caller.email.as_deref(), Some("owner@fleet.example"));
    }

    #[tokio::test]
    async fn test_local_verification_rejects_bad_tokens() {
        let verifier = SupabaseVerifier::new("", "", Some(SECRET.to_string()));

        let expired = sign(SECRET, "authenticated", -3600);
        let wrong_aud = sign(SECRET, "anon", 3600);
        let wrong_secret = sign("some-other-secret", "authenticated", 3600);

        for token in [expired, wrong_aud, wrong_secret, "not-a-jwt".to_string()] {
            let result = verifier.verify(Some(token.as_str())).await;
            assert!(
                matches!(result, Err(BillingError::Unauthorized(_))),
                "token should be rejected: {}",
                token
            );
        }
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthorized() {
        let verifier = SupabaseVerifier::new("", "", Some(SECRET.to_string()));
        assert!(matches!(
            verifier.verify(None).await,
            Err(BillingError::Unauthorized(_))
        ));
        assert!(matches!(
            verifier.verify(Some("  ")).await,
            Err(BillingError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_verification_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer remote-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"user-remote","email":"remote@fleet.example","role":"authenticated"}"#)
            .create_async()
            .await;

        let verifier = SupabaseVerifier::new(server.url(), "anon-key", None);
        let caller = verifier.verify(Some("remote-token")).await.unwrap();

        assert_eq!(caller.user_id, "user-remote");
        assert_eq!(caller.email.as_deref(), Some("remote@fleet.example"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_verification_rejected() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"msg":"invalid JWT"}"#)
            .create_async()
            .await;

        let verifier = SupabaseVerifier::new(server.url(), "anon-key", None);
        assert!(matches!(
            verifier.verify(Some("stale-token")).await,
            Err(BillingError::Unauthorized(_))
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_verification_without_config_never_calls_out() {
        let verifier = SupabaseVerifier::new("", "", None);
        assert!(matches!(
            verifier.verify_token("any").await,
            Err(AuthError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_nothing_is_cached_between_calls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"user-remote","email":null}"#)
            .expect(2)
            .create_async()
            .await;

        let verifier = SupabaseVerifier::new(server.url(), "anon-key", None);
        verifier.verify(Some("same-token")).await.unwrap();
        verifier.verify(Some("same-token")).await.unwrap();
        mock.assert_async().await;
    }
}
