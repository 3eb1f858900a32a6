//! Process configuration read from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_JWT_SECRET: &str = "dev-secret";
const DEFAULT_SITE_URL: &str = "http://localhost:8080";
const DEFAULT_TASK_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_TASK_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Runtime settings for the API process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// True when `JWT_SECRET` was not provided and the dev default is in use.
    pub jwt_secret_is_default: bool,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    /// Public base URL used when rendering links in outgoing mail.
    pub site_url: String,
    pub task_poll_interval: Duration,
    pub task_max_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", &bind_raw, e))?;

        let (jwt_secret, jwt_secret_is_default) = match var("JWT_SECRET") {
            Some(secret) => (secret, false),
            None => (DEFAULT_JWT_SECRET.to_string(), true),
        };

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };

        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let site_url = var("SITE_URL")
            .unwrap_or_else(|| DEFAULT_SITE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let poll_ms = match var("TASK_POLL_INTERVAL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| invalid("TASK_POLL_INTERVAL_MS", &raw, e))?,
            None => DEFAULT_TASK_POLL_INTERVAL_MS,
        };
        if poll_ms == 0 {
            return Err(invalid("TASK_POLL_INTERVAL_MS", "0", "must be positive"));
        }

        let task_max_attempts = match var("TASK_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|e| invalid("TASK_MAX_ATTEMPTS", &raw, e))?,
            None => DEFAULT_TASK_MAX_ATTEMPTS,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            jwt_secret_is_default,
            use_persistent_stores,
            database_url,
            site_url,
            task_poll_interval: Duration::from_millis(poll_ms),
            task_max_attempts,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_secret_is_default: true,
            use_persistent_stores: false,
            database_url: None,
            site_url: DEFAULT_SITE_URL.to_string(),
            task_poll_interval: Duration::from_millis(DEFAULT_TASK_POLL_INTERVAL_MS),
            task_max_attempts: DEFAULT_TASK_MAX_ATTEMPTS,
        }
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, raw, "expected a boolean")),
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
