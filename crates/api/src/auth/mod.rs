//! Authentication module for AutoDispatch

pub mod middleware;
#[cfg(test)]
mod middleware_tests;

pub use middleware::{
    extract_bearer_token, AuthError, SupabaseClaims, SupabaseVerifier, AUTH_COOKIE,
};
