//! Configuration loading and validation
//!
//! Spinneret is configured through a TOML file covering crawler behavior
//! (timeouts, depth limit, user agent), worker pool sizing, frontier
//! backend selection, and seed URLs. All fields carry defaults, so an
//! empty file is a valid configuration.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{Config, CrawlerConfig, FrontierConfig, PoolConfig};
pub use validation::validate;
