//! Server configuration

/// Default CORS allow-list for local development
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a positive integer, got '{1}'")]
    InvalidNumber(&'static str, String),
}

/// Server configuration loaded once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Public site origin used for checkout redirects, without trailing `/`
    pub base_url: Option<String>,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Enables local HS256 verification of Supabase access tokens
    pub supabase_jwt_secret: Option<String>,
    /// Shared secret for the catalog sync trigger; unset disables it
    pub admin_sync_token: Option<String>,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            base_url: None,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: None,
            admin_sync_token: None,
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            request_timeout_secs: 30,
            log_json: false,
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let base_url = get("NEXT_PUBLIC_SITE_URL")
            .or_else(|| get("BASE_URL"))
            .map(|url| url.trim().trim_end_matches('/').to_string());

        let request_timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::InvalidNumber("REQUEST_TIMEOUT_SECS", raw)),
            },
            None => defaults.request_timeout_secs,
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            base_url,
            supabase_url: get("SUPABASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            supabase_anon_key: get("SUPABASE_ANON_KEY").unwrap_or_default(),
            supabase_jwt_secret: get("SUPABASE_JWT_SECRET"),
            admin_sync_token: get("ADMIN_SYNC_TOKEN"),
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or(defaults.allowed_origins),
            request_timeout_secs,
            log_json: get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.base_url, None);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.allowed_origins.len(), 2);
        assert!(config.admin_sync_token.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn test_site_url_wins_and_is_trimmed() {
        let config = Config::from_lookup(lookup(&[
            ("NEXT_PUBLIC_SITE_URL", "https://autodispatch.ai/"),
            ("BASE_URL", "https://other.example"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://autodispatch.ai"));

        let config = Config::from_lookup(lookup(&[("BASE_URL", "https://b.example/")])).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://b.example"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = Config::from_lookup(lookup(&[
            ("ADMIN_SYNC_TOKEN", "  "),
            ("SUPABASE_JWT_SECRET", ""),
        ]))
        .unwrap();
        assert!(config.admin_sync_token.is_none());
        assert!(config.supabase_jwt_secret.is_none());
    }

    #[test]
    fn test_origins_and_log_format() {
        let config = Config::from_lookup(lookup(&[
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.log_json);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
        std::env::set_var("ADMIN_SYNC_TOKEN", "env-token");
        let config = Config::from_env();
        std::env::remove_var("BIND_ADDRESS");
        std::env::remove_var("ADMIN_SYNC_TOKEN");

        let config = config.unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.admin_sync_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn test_invalid_timeout_is_rejected() {
        assert!(Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "0")])).is_err());
        let config = Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "5")])).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
    }
}
