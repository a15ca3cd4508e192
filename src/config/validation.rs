//! Configuration validation
//!
//! Checks that a parsed configuration is internally consistent before any
//! crawling begins. Validation failures are fatal at startup.

use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawler.fetch_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "fetch-timeout-ms must be greater than 0".to_string(),
        ));
    }

    if config.crawler.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max-depth must be -1 (unlimited) or non-negative, got {}",
            config.crawler.max_depth
        )));
    }

    if config.pool.core_size == 0 {
        return Err(ConfigError::Validation(
            "pool core-size must be greater than 0".to_string(),
        ));
    }

    if config.pool.max_size < config.pool.core_size {
        return Err(ConfigError::Validation(format!(
            "pool max-size ({}) must be at least core-size ({})",
            config.pool.max_size, config.pool.core_size
        )));
    }

    if config.pool.queue_size == 0 {
        return Err(ConfigError::Validation(
            "pool queue-size must be greater than 0".to_string(),
        ));
    }

    if config.frontier.backend.is_empty() {
        return Err(ConfigError::Validation(
            "frontier backend must not be empty".to_string(),
        ));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed).map_err(|e| {
            ConfigError::InvalidSeed(format!("{}: {}", seed, e))
        })?;
        match url.scheme() {
            "http" | "https" | "file" => {}
            other => {
                return Err(ConfigError::InvalidSeed(format!(
                    "{}: unsupported scheme '{}'",
                    seed, other
                )));
            }
        }
    }

    Ok(())
}
