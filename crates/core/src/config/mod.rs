//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LARDER_*)
//! 2. TOML config file (if LARDER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// How the `no-cache` directive is detected in a response's Cache-Control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoCacheMode {
    /// A directive named exactly `no-cache`, with or without a field list.
    #[default]
    Token,
    /// Any case-sensitive occurrence of `no-cache` in the raw header value.
    Substring,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LARDER_*)
/// 2. TOML config file (if LARDER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite store.
    ///
    /// Set via LARDER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Prefix for every key written to the store.
    ///
    /// Set via LARDER_NAMESPACE environment variable.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via LARDER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via LARDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Redirects the transport follows before giving up.
    ///
    /// Set via LARDER_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Freshness applied when a response has Cache-Control but no max-age.
    /// Unset means such responses only get a long-term copy.
    ///
    /// Set via LARDER_DEFAULT_CACHE_TIMEOUT_SECS environment variable.
    #[serde(default)]
    pub default_cache_timeout_secs: Option<u64>,

    /// Lifetime of the long-term copy kept for revalidation.
    ///
    /// Set via LARDER_LONG_TERM_SECS environment variable.
    #[serde(default = "default_long_term_secs")]
    pub long_term_secs: u64,

    /// `token` or `substring`.
    ///
    /// Set via LARDER_NO_CACHE_MODE environment variable.
    #[serde(default)]
    pub no_cache_mode: NoCacheMode,

    /// Upper bound on how long a batch call waits for all of its results.
    ///
    /// Set via LARDER_BATCH_WAIT_MS environment variable.
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,

    /// Maximum number of batch requests in flight at once.
    ///
    /// Set via LARDER_MAX_CONCURRENCY environment variable.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./larder-store.sqlite")
}

fn default_namespace() -> String {
    "larder".into()
}

fn default_user_agent() -> String {
    "larder/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_long_term_secs() -> u64 {
    60 * 60 * 24 * 30 // 30 days
}

fn default_batch_wait_ms() -> u64 {
    300_000
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            namespace: default_namespace(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            default_cache_timeout_secs: None,
            long_term_secs: default_long_term_secs(),
            no_cache_mode: NoCacheMode::Token,
            batch_wait_ms: default_batch_wait_ms(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Batch wait bound as Duration.
    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }

    pub fn default_cache_timeout(&self) -> Option<TimeDelta> {
        self.default_cache_timeout_secs.map(secs_to_delta)
    }

    pub fn long_term(&self) -> TimeDelta {
        secs_to_delta(self.long_term_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LARDER_`
    /// 2. TOML file from `LARDER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("LARDER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LARDER_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

fn secs_to_delta(secs: u64) -> TimeDelta {
    crate::store::ttl_from_secs(i64::try_from(secs).unwrap_or(i64::MAX))
}
