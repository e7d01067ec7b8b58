//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::store::MAX_TTL_SECS;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `namespace` is empty, or `namespace` contains `:`
    /// - `max_concurrency` is 0 or exceeds 64
    /// - `long_term_secs` is 0 or shorter than `default_cache_timeout_secs`
    /// - `default_cache_timeout_secs` is 0
    /// - `long_term_secs` or `default_cache_timeout_secs` exceeds `MAX_TTL_SECS`
    /// - `batch_wait_ms` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(ConfigError::Invalid {
                field: "namespace".into(),
                reason: "must be non-empty and must not contain ':'".into(),
            });
        }

        if self.max_concurrency == 0 || self.max_concurrency > 64 {
            return Err(ConfigError::Invalid { field: "max_concurrency".into(), reason: "must be between 1 and 64".into() });
        }

        if self.batch_wait_ms == 0 {
            return Err(ConfigError::Invalid { field: "batch_wait_ms".into(), reason: "must be greater than 0".into() });
        }

        if self.long_term_secs == 0 {
            return Err(ConfigError::Invalid { field: "long_term_secs".into(), reason: "must be greater than 0".into() });
        }

        let max_ttl = MAX_TTL_SECS.unsigned_abs();
        if self.long_term_secs > max_ttl {
            return Err(ConfigError::Invalid {
                field: "long_term_secs".into(),
                reason: format!("must not exceed {max_ttl} seconds"),
            });
        }

        if let Some(default_timeout) = self.default_cache_timeout_secs {
            if default_timeout > max_ttl {
                return Err(ConfigError::Invalid {
                    field: "default_cache_timeout_secs".into(),
                    reason: format!("must not exceed {max_ttl} seconds"),
                });
            }
            if default_timeout == 0 {
                return Err(ConfigError::Invalid {
                    field: "default_cache_timeout_secs".into(),
                    reason: "must be greater than 0 when set".into(),
                });
            }
            if default_timeout > self.long_term_secs {
                return Err(ConfigError::Invalid {
                    field: "long_term_secs".into(),
                    reason: "must not be shorter than default_cache_timeout_secs".into(),
                });
            }
        }

        if self.max_redirects == 0 {
            tracing::warn!("max_redirects is 0; every redirect will fail with TOO_MANY_REDIRECTS");
        }

        Ok(())
    }
}
