//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on missing or malformed values.
//! The store URL is wrapped in `secrecy::SecretString` so it never lands
//! in logs.

use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::coordinator::DegradationPolicy;
use crate::error::{Error, Result};
use crate::normalize::DEFAULT_TICKET_PATTERN;
use crate::store::{DEFAULT_DEDUP_WINDOW, RetryPolicy};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    /// Durable store identifier (Postgres connection URL).
    pub store_url: SecretString,
    /// Region label of the store, reported with telemetry.
    pub store_region: Option<String>,
    /// How long a claim blocks re-claims of the same key.
    pub dedup_window: Duration,
    /// Local cache capacity.
    pub cache_capacity: usize,
    /// Store call retry budget.
    pub retry: RetryPolicy,
    /// Behavior while the store is unreachable.
    pub degraded_mode: DegradationPolicy,
    /// Regex locating ticket references in chat text.
    pub ticket_pattern: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store_url = var("LOCK_STORE_URL").ok_or_else(|| {
            Error::Config("required environment variable LOCK_STORE_URL is not set".into())
        })?;

        let dedup_secs: u64 = parse_var(&var, "DEDUP_WINDOW_SECS", DEFAULT_DEDUP_WINDOW.as_secs())?;
        if dedup_secs == 0 {
            return Err(Error::Config("DEDUP_WINDOW_SECS must be positive".into()));
        }

        let cache_capacity: usize = parse_var(&var, "LOCAL_CACHE_CAPACITY", DEFAULT_CAPACITY)?;
        if cache_capacity == 0 {
            return Err(Error::Config("LOCAL_CACHE_CAPACITY must be at least 1".into()));
        }

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = parse_var(&var, "STORE_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(Error::Config("STORE_MAX_ATTEMPTS must be at least 1".into()));
        }
        let timeout_ms: u64 = parse_var(
            &var,
            "STORE_TIMEOUT_MS",
            u64::try_from(defaults.attempt_timeout.as_millis()).unwrap_or(u64::MAX),
        )?;
        if timeout_ms == 0 {
            return Err(Error::Config("STORE_TIMEOUT_MS must be positive".into()));
        }

        let degraded_mode = match var("DEGRADED_MODE") {
            Some(mode) => mode.parse()?,
            None => DegradationPolicy::default(),
        };

        let ticket_pattern =
            var("TICKET_PATTERN").unwrap_or_else(|| DEFAULT_TICKET_PATTERN.to_string());
        regex::Regex::new(&ticket_pattern)
            .map_err(|e| Error::Config(format!("TICKET_PATTERN is not a valid regex: {e}")))?;

        Ok(Self {
            store_url: SecretString::from(store_url),
            store_region: var("LOCK_STORE_REGION"),
            dedup_window: Duration::from_secs(dedup_secs),
            cache_capacity,
            retry: RetryPolicy {
                max_attempts,
                attempt_timeout: Duration::from_millis(timeout_ms),
                ..defaults
            },
            degraded_mode,
            ticket_pattern,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}
