use std::time::Duration;

use anyhow::{Context, Result};

use crate::rate_limit::{RateLimitConfig, WindowConfig};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Shared counter backend for rate limiting. `None` means a single-instance
    /// deployment using the in-process counter store.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    /// Model used for the default tier.
    pub ai_model: String,
    /// Model used when a request sets `pro: true`.
    pub ai_model_pro: String,
    /// Header carrying the caller identity, set by the upstream session gateway.
    pub identity_header: String,
    pub rate_limits: RateLimitConfig,
    pub generation_timeout: Duration,
    /// Generations still `running` after this long are swept to `failed`.
    pub stale_generation_after: Duration,
    pub reconcile_interval: Duration,
    pub port: u16,
    pub rust_log: String,
}

const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ai_model = optional_env("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let ai_model_pro = optional_env("AI_MODEL_PRO").unwrap_or_else(|| ai_model.clone());

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            ai_model,
            ai_model_pro,
            identity_header: optional_env("IDENTITY_HEADER")
                .unwrap_or_else(|| "x-user-id".to_string())
                .to_ascii_lowercase(),
            rate_limits: RateLimitConfig {
                user: WindowConfig {
                    max_requests: parse_env("RATE_LIMIT_USER_MAX", 20)?,
                    window: Duration::from_secs(parse_env("RATE_LIMIT_USER_WINDOW_SECS", 60)?),
                },
                ip: WindowConfig {
                    max_requests: parse_env("RATE_LIMIT_IP_MAX", 15)?,
                    window: Duration::from_secs(parse_env("RATE_LIMIT_IP_WINDOW_SECS", 10)?),
                },
            },
            generation_timeout: Duration::from_secs(parse_env("GENERATION_TIMEOUT_SECS", 90)?),
            stale_generation_after: Duration::from_secs(
                parse_env::<u64>("STALE_GENERATION_MINUTES", 15)? * 60,
            ),
            reconcile_interval: Duration::from_secs(parse_env("RECONCILE_INTERVAL_SECS", 60)?),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration used by the in-process test harness.
    pub fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/tailor_test".to_string(),
            redis_url: None,
            anthropic_api_key: "test-key".to_string(),
            ai_model: "test-model".to_string(),
            ai_model_pro: "test-model-pro".to_string(),
            identity_header: "x-user-id".to_string(),
            rate_limits: RateLimitConfig::default(),
            generation_timeout: Duration::from_secs(5),
            stale_generation_after: Duration::from_secs(15 * 60),
            reconcile_interval: Duration::from_secs(60),
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}
