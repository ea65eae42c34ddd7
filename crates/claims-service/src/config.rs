//! Configuration management for the claims service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::service::ServiceSettings;

/// Where claims are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Redis,
    /// Process-local, lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("Unknown STORAGE_BACKEND: {}", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,

    pub port: u16,

    pub storage_backend: StorageBackend,

    pub redis_url: String,

    /// Base URL verification links point at
    pub public_base_url: String,

    /// Bearer secret for admin endpoints
    pub admin_secret: Option<String>,

    /// Submissions allowed per requester per window
    pub rate_limit_max: u32,

    pub rate_limit_window_secs: u64,

    pub storage_timeout_ms: u64,

    /// Endpoint receiving notification events; notifications are only logged when unset
    pub notify_webhook_url: Option<String>,
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("CLAIMS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("CLAIMS_PORT")
                .unwrap_or_else(|_| "8086".to_string())
                .parse()
                .context("Invalid CLAIMS_PORT")?,

            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "https://ombaa.com".to_string()),

            admin_secret: optional_var("CLAIMS_ADMIN_SECRET"),

            rate_limit_max: env::var("RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_MAX")?,

            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid RATE_LIMIT_WINDOW_SECS")?,

            storage_timeout_ms: env::var("STORAGE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("Invalid STORAGE_TIMEOUT_MS")?,

            notify_webhook_url: optional_var("NOTIFY_WEBHOOK_URL"),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("CLAIMS_PORT must be greater than 0");
        }

        if self.rate_limit_max == 0 {
            anyhow::bail!("RATE_LIMIT_MAX must be greater than 0");
        }

        if self.rate_limit_window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be greater than 0");
        }

        if self.storage_timeout_ms == 0 {
            anyhow::bail!("STORAGE_TIMEOUT_MS must be greater than 0");
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            anyhow::bail!("PUBLIC_BASE_URL must be an http(s) URL");
        }

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.rate_limit_max,
            window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            public_base_url: self.public_base_url.clone(),
            storage_timeout: Duration::from_millis(self.storage_timeout_ms),
        }
    }
}
