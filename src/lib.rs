//! Spinneret: a concurrent web-crawling engine
//!
//! Given one or more seed URLs, Spinneret fetches pages, extracts outbound
//! links, and schedules further fetches under depth limits, de-duplication,
//! and bounded concurrency. Crawl policy and content handling are delegated
//! to the embedding application through the [`CrawlPolicy`] trait.

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod policy;

use thiserror::Error;

/// Main error type for Spinneret operations
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] frontier::FrontierError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are the only fatal errors in the system: they occur at startup
/// only, before any crawling has begun.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid seed URL: {0}")]
    InvalidSeed(String),

    #[error("Unknown frontier backend: {0}")]
    UnknownBackend(String),

    #[error("Frontier backend unavailable: {0}")]
    Backend(String),
}

/// Result type alias for Spinneret operations
pub type Result<T> = std::result::Result<T, SpiderError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, CrawlSummary, LinkExtractor, Spider, SpiderHandle};
pub use frontier::{create_frontier, Frontier, FrontierError, WorkRecord, WorkStatus};
pub use policy::{CrawlPolicy, ErrorSeverity, FollowAll, LinkKind};
