// Configuration management

use crate::core::errors::GatewayError;
use serde::{Deserialize, Serialize};
use std::env;

pub const MISSING_DATABASE_URL: &str =
    "Database URL is not set. Please set ARCHESTRA_DATABASE_URL or DATABASE_URL";

/// Application configuration loaded from environment variables.
///
/// The database URL is the only hard startup requirement; the upstream API
/// key is read lazily so the admin surface works without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Storage
    pub database_url: String,

    // Upstream provider
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub upstream_timeout_secs: u64,

    // Policy read cache
    pub policy_cache_ttl_secs: u64,

    // Middleware
    pub body_size_limit_bytes: usize,

    // Logging
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, GatewayError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // Ignore errors (file may not exist)
        }

        let database_url = Self::get_optional_env("ARCHESTRA_DATABASE_URL")
            .or_else(|| Self::get_optional_env("DATABASE_URL"))
            .ok_or_else(|| GatewayError::Configuration(MISSING_DATABASE_URL.to_string()))?;

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0"),
            port: Self::parse_port()?,
            database_url,
            openai_api_key: Self::get_optional_env("OPENAI_API_KEY"),
            openai_base_url: Self::get_env_or_default(
                "OPENAI_BASE_URL",
                "https://api.openai.com/v1",
            ),
            upstream_timeout_secs: Self::parse_u64_or_default("UPSTREAM_TIMEOUT_SECS", 120)?,
            policy_cache_ttl_secs: Self::parse_u64_or_default("POLICY_CACHE_TTL_SECS", 60)?,
            body_size_limit_bytes: Self::parse_u64_or_default(
                "BODY_SIZE_LIMIT_BYTES",
                10 * 1024 * 1024,
            )? as usize,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "text"),
        };

        config.validate()?;
        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    fn get_optional_env(key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn parse_port() -> Result<u16, GatewayError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "9099".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            GatewayError::Configuration(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;
        if port == 0 {
            return Err(GatewayError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }
        Ok(port)
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, GatewayError> {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse::<u64>().map_err(|e| {
                    GatewayError::Configuration(format!(
                        "Invalid {} value '{}': {}",
                        key, value, e
                    ))
                })?;
                if parsed == 0 {
                    return Err(GatewayError::Configuration(format!(
                        "{} must be greater than 0",
                        key
                    )));
                }
                Ok(parsed)
            }
            _ => Ok(default),
        }
    }

    fn validate(&self) -> Result<(), GatewayError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(GatewayError::Configuration(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }
        if self.log_format != "json" && self.log_format != "text" {
            return Err(GatewayError::Configuration(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                self.log_format
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Configuration for unit and integration tests: in-memory database, no
    /// upstream credentials.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 9099,
            database_url: "sqlite::memory:".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            upstream_timeout_secs: 5,
            policy_cache_ttl_secs: 60,
            body_size_limit_bytes: 10 * 1024 * 1024,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
