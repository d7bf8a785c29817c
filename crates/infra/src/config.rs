//! Process configuration read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::cache::DEFAULT_PREFIX;

pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required when {reason}")]
    Missing { var: &'static str, reason: &'static str },

    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres repositories (and Redis cache when `redis_url` is set)
    /// instead of in-memory stores.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cache_enabled: bool,
    pub cache_prefix: String,
    /// Capacity of the in-memory cache; unbounded when unset.
    pub cache_max_entries: Option<usize>,
    /// Local bucket directory; in-memory bucket when unset.
    pub storage_dir: Option<PathBuf>,
    pub storage_public_base_url: Option<String>,
    pub upload_workers: usize,
    pub job_poll_interval: Duration,
    /// Create tenant records for unknown tenants seen in valid tokens.
    pub auto_provision_tenants: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            use_persistent_stores: false,
            database_url: None,
            redis_url: None,
            cache_enabled: true,
            cache_prefix: DEFAULT_PREFIX.to_string(),
            cache_max_entries: None,
            storage_dir: None,
            storage_public_base_url: None,
            upload_workers: 4,
            job_poll_interval: Duration::from_millis(100),
            auto_provision_tenants: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| invalid("BIND_ADDR", &v, e))?,
            None => defaults.bind_addr,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let use_persistent_stores = parse_bool(&get, "USE_PERSISTENT_STORES", defaults.use_persistent_stores)?;
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                var: "DATABASE_URL",
                reason: "USE_PERSISTENT_STORES=true",
            });
        }

        let cache_max_entries = match get("CACHE_MAX_ENTRIES") {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => return Err(invalid("CACHE_MAX_ENTRIES", &v, "must be positive")),
                Ok(n) => Some(n),
                Err(e) => return Err(invalid("CACHE_MAX_ENTRIES", &v, e)),
            },
            None => None,
        };

        let upload_workers = match get("UPLOAD_WORKERS") {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => return Err(invalid("UPLOAD_WORKERS", &v, "must be positive")),
                Ok(n) => n,
                Err(e) => return Err(invalid("UPLOAD_WORKERS", &v, e)),
            },
            None => defaults.upload_workers,
        };

        let job_poll_interval = match get("JOB_POLL_INTERVAL_MS") {
            Some(v) => Duration::from_millis(
                v.parse::<u64>()
                    .map_err(|e| invalid("JOB_POLL_INTERVAL_MS", &v, e))?,
            ),
            None => defaults.job_poll_interval,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            use_persistent_stores,
            database_url,
            redis_url: get("REDIS_URL"),
            cache_enabled: parse_bool(&get, "CACHE_ENABLED", defaults.cache_enabled)?,
            cache_prefix: get("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            cache_max_entries,
            storage_dir: get("STORAGE_DIR").map(PathBuf::from),
            storage_public_base_url: get("STORAGE_PUBLIC_BASE_URL"),
            upload_workers,
            job_poll_interval,
            auto_provision_tenants: parse_bool(&get, "AUTO_PROVISION_TENANTS", defaults.auto_provision_tenants)?,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(var, &v, "expected a boolean")),
        },
    }
}
