//! Server configuration module
//! Handles the environment-driven configuration of the API server

use crate::constants::{
    DEFAULT_ALLOWED_ORIGIN, DEFAULT_AUTH_MIN_MS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_PROVIDER_TIMEOUT_MS, DEFAULT_RATE_LIMIT_MAX_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW_MS,
    DEFAULT_WEBHOOK_TIMEOUT_MS, MAX_PROVIDER_TIMEOUT_MS,
};
use crate::error::{GymTrackerError, Result};
use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use url::Url;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the hosted identity/data provider
    pub provider_url: Url,
    /// Public (anon) key sent with every provider call
    pub provider_public_key: String,
    /// Elevated key, used only for admin data paths
    pub provider_service_key: Option<String>,
    /// Upper bound for every outbound provider call
    pub provider_timeout: Duration,
    pub webhook_url: Option<Url>,
    pub webhook_timeout: Duration,
    /// CORS allow-list
    pub allowed_origins: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    /// Honour forwarded-for headers coming from `trusted_proxies`
    pub trust_proxy: bool,
    pub trusted_proxies: Vec<IpAddr>,
    /// Minimum time spent on an authentication rejection
    pub auth_min_duration: Duration,
    pub development_mode: bool,
    pub environment: String,
}

fn parse_flag(value: Option<String>) -> bool {
    value
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    /// Configuration for tests: points at `provider_url`, no rate limiting pressure
    /// and no artificial rejection delay. Never use in production.
    pub fn for_testing(provider_url: &str) -> Result<Self> {
        Ok(Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            provider_url: Self::validate_provider_url(provider_url)?,
            provider_public_key: "test-public-key-for-unit-tests-only".to_string(),
            provider_service_key: Some("test-service-key-for-unit-tests-only".to_string()),
            provider_timeout: Duration::from_millis(500),
            webhook_url: None,
            webhook_timeout: Duration::from_millis(500),
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 10_000,
            trust_proxy: false,
            trusted_proxies: Vec::new(),
            auth_min_duration: Duration::ZERO,
            development_mode: true,
            environment: "test".to_string(),
        })
    }

    /// Validate the provider base URL
    fn validate_provider_url(raw: &str) -> Result<Url> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            GymTrackerError::ConfigError(format!("SUPABASE_URL is not a valid URL: {}", e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(GymTrackerError::ConfigError(format!(
                "SUPABASE_URL must use http or https, got '{}'",
                other
            ))),
        }
    }

    /// Validate that a provider key looks usable
    fn validate_key(key: &str, key_type: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(GymTrackerError::ConfigError(format!(
                "{} must not be empty",
                key_type
            )));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GymTrackerError::ConfigError(format!(
                "{} contains whitespace or control characters",
                key_type
            )));
        }
        Ok(())
    }

    /// The elevated key must never double as the public key
    fn validate_keys_are_different(public_key: &str, service_key: &str) -> Result<()> {
        if public_key == service_key {
            return Err(GymTrackerError::ConfigError(
                "SUPABASE_SERVICE_ROLE_KEY must be different from SUPABASE_ANON_KEY. \
                 The elevated key must never be shipped as the public key."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn validate_timeout(ms: u64, name: &str) -> Result<Duration> {
        if ms == 0 || ms > MAX_PROVIDER_TIMEOUT_MS {
            return Err(GymTrackerError::ConfigError(format!(
                "{} must be between 1 and {} milliseconds",
                name, MAX_PROVIDER_TIMEOUT_MS
            )));
        }
        Ok(Duration::from_millis(ms))
    }

    /// Reduce a configured origin to `scheme://host[:port]`
    fn normalize_origin(raw: &str) -> Result<String> {
        let url = Url::parse(raw).map_err(|e| {
            GymTrackerError::ConfigError(format!("Invalid CORS origin '{}': {}", raw, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(GymTrackerError::ConfigError(format!(
                "CORS origin '{}' must be an http(s) origin",
                raw
            )));
        }
        Ok(url.origin().ascii_serialization())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("GYM_TRACKER_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = parse_or(
            lookup("GYM_TRACKER_PORT").or_else(|| lookup("PORT")),
            DEFAULT_PORT,
        );

        let provider_url = lookup("SUPABASE_URL").ok_or_else(|| {
            GymTrackerError::ConfigError(
                "SUPABASE_URL environment variable is required (identity provider base URL)"
                    .to_string(),
            )
        })?;
        let provider_url = Self::validate_provider_url(&provider_url)?;

        let provider_public_key = lookup("SUPABASE_ANON_KEY").ok_or_else(|| {
            GymTrackerError::ConfigError(
                "SUPABASE_ANON_KEY environment variable is required".to_string(),
            )
        })?;
        Self::validate_key(&provider_public_key, "SUPABASE_ANON_KEY")?;

        let provider_service_key = lookup("SUPABASE_SERVICE_ROLE_KEY").filter(|k| !k.is_empty());
        if let Some(ref service_key) = provider_service_key {
            Self::validate_key(service_key, "SUPABASE_SERVICE_ROLE_KEY")?;
            Self::validate_keys_are_different(&provider_public_key, service_key)?;
        }

        let provider_timeout = Self::validate_timeout(
            parse_or(
                lookup("GYM_TRACKER_PROVIDER_TIMEOUT_MS"),
                DEFAULT_PROVIDER_TIMEOUT_MS,
            ),
            "GYM_TRACKER_PROVIDER_TIMEOUT_MS",
        )?;

        let webhook_url = match lookup("N8N_WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            Some(raw) => Some(Url::parse(raw.trim()).map_err(|e| {
                GymTrackerError::ConfigError(format!("N8N_WEBHOOK_URL is not a valid URL: {}", e))
            })?),
            None => None,
        };
        let webhook_timeout = Self::validate_timeout(
            parse_or(
                lookup("GYM_TRACKER_WEBHOOK_TIMEOUT_MS"),
                DEFAULT_WEBHOOK_TIMEOUT_MS,
            ),
            "GYM_TRACKER_WEBHOOK_TIMEOUT_MS",
        )?;

        let mut allowed_origins: Vec<String> = lookup("GYM_TRACKER_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec![DEFAULT_ALLOWED_ORIGIN.to_string()]);
        if let Some(frontend) = lookup("FRONTEND_URL").filter(|f| !f.trim().is_empty()) {
            allowed_origins.push(frontend.trim().to_string());
        }
        let mut normalized_origins: Vec<String> = Vec::with_capacity(allowed_origins.len());
        for origin in &allowed_origins {
            let origin = Self::normalize_origin(origin)?;
            if !normalized_origins.contains(&origin) {
                normalized_origins.push(origin);
            }
        }
        let allowed_origins = normalized_origins;

        let rate_limit_window = Duration::from_millis(parse_or(
            lookup("RATE_LIMIT_WINDOW_MS"),
            DEFAULT_RATE_LIMIT_WINDOW_MS,
        ));
        let rate_limit_max_requests = parse_or(
            lookup("RATE_LIMIT_MAX_REQUESTS"),
            DEFAULT_RATE_LIMIT_MAX_REQUESTS,
        );
        if rate_limit_max_requests == 0 || rate_limit_window.is_zero() {
            return Err(GymTrackerError::ConfigError(
                "RATE_LIMIT_WINDOW_MS and RATE_LIMIT_MAX_REQUESTS must be positive".to_string(),
            ));
        }

        let trust_proxy = parse_flag(lookup("TRUST_PROXY"));
        let trusted_proxies = match lookup("GYM_TRACKER_TRUSTED_PROXIES") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.parse::<IpAddr>().map_err(|_| {
                        GymTrackerError::ConfigError(format!(
                            "GYM_TRACKER_TRUSTED_PROXIES contains an invalid IP address: {}",
                            p
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
        };

        let auth_min_duration = Duration::from_millis(parse_or(
            lookup("GYM_TRACKER_AUTH_MIN_MS"),
            DEFAULT_AUTH_MIN_MS,
        ));

        let development_mode = parse_flag(lookup("GYM_TRACKER_DEVELOPMENT_MODE")); // SECURITY: Default to false

        let environment = lookup("GYM_TRACKER_ENV")
            .or_else(|| lookup("NODE_ENV"))
            .unwrap_or_else(|| "development".to_string());

        Ok(Self {
            host,
            port,
            provider_url,
            provider_public_key,
            provider_service_key,
            provider_timeout,
            webhook_url,
            webhook_timeout,
            allowed_origins,
            rate_limit_window,
            rate_limit_max_requests,
            trust_proxy,
            trusted_proxies,
            auth_min_duration,
            development_mode,
            environment,
        })
    }
}
