use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::scrapers::FetchOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_address: String,
    pub database_path: String,
    pub cache_ttl: Duration,
    /// 0 disables the bound
    pub cache_max_entries: usize,
    pub http_timeout: Duration,
    pub http_retries: u32,
    pub http_retry_delay: Duration,
    pub browser_timeout: Duration,
    pub browser_enabled: bool,
    pub max_results_per_source: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            database_path: "listings.db".to_string(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 1000,
            http_timeout: Duration::from_secs(15),
            http_retries: 3,
            http_retry_delay: Duration::from_millis(1000),
            browser_timeout: Duration::from_secs(30),
            browser_enabled: true,
            max_results_per_source: 50,
        }
    }
}

impl Config {
    /// Read the environment (and `.env`, when present) over the defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        Ok(Self {
            bind_address: string("BIND_ADDRESS", defaults.bind_address),
            database_path: string("DATABASE_PATH", defaults.database_path),
            cache_ttl: Duration::from_secs(parsed(&lookup, "CACHE_TTL_SECS", 300)?),
            cache_max_entries: parsed(&lookup, "CACHE_MAX_ENTRIES", defaults.cache_max_entries)?,
            http_timeout: Duration::from_secs(parsed(&lookup, "HTTP_TIMEOUT_SECS", 15)?),
            http_retries: parsed(&lookup, "HTTP_RETRIES", defaults.http_retries)?,
            http_retry_delay: Duration::from_millis(parsed(&lookup, "HTTP_RETRY_DELAY_MS", 1000)?),
            browser_timeout: Duration::from_secs(parsed(&lookup, "BROWSER_TIMEOUT_SECS", 30)?),
            browser_enabled: parsed(&lookup, "BROWSER_ENABLED", defaults.browser_enabled)?,
            max_results_per_source: parsed(&lookup, "MAX_RESULTS_PER_SOURCE", defaults.max_results_per_source)?,
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            retries: self.http_retries,
            retry_delay: self.http_retry_delay,
            timeout: self.http_timeout,
        }
    }

    pub fn cache_limit(&self) -> Option<usize> {
        (self.cache_max_entries > 0).then_some(self.cache_max_entries)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
