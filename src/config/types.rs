use serde::Deserialize;

/// Main configuration structure for Spinneret
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    /// Seed URLs added to the frontier at depth 0 before the crawl starts
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// How many milliseconds to wait when downloading pages
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum depth to crawl from seed URLs; -1 means no maximum
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: i64,

    /// User-Agent header reported to web sites, if any
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Core pool size
    #[serde(rename = "core-size", default = "default_pool_core_size")]
    pub core_size: u32,

    /// Maximum pool size
    #[serde(rename = "max-size", default = "default_pool_max_size")]
    pub max_size: u32,

    /// Capacity of the pending-task queue
    #[serde(rename = "queue-size", default = "default_pool_queue_size")]
    pub queue_size: u32,

    /// How long, in seconds, to keep idle connections alive
    #[serde(rename = "keep-alive-secs", default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Grace period, in seconds, for in-flight tasks during shutdown
    #[serde(rename = "shutdown-grace-secs", default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Frontier backend selection and connection parameters
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    /// Backend selector: "memory" or "sqlite"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the SQLite database file (sqlite backend only)
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

fn default_fetch_timeout_ms() -> u64 {
    120_000
}

fn default_max_depth() -> i64 {
    -1
}

fn default_pool_core_size() -> u32 {
    20
}

fn default_pool_max_size() -> u32 {
    20
}

fn default_pool_queue_size() -> u32 {
    5
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    60
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_database_path() -> String {
    "./spider-work.db".to_string()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_depth: default_max_depth(),
            user_agent: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: default_pool_core_size(),
            max_size: default_pool_max_size(),
            queue_size: default_pool_queue_size(),
            keep_alive_secs: default_keep_alive_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            pool: PoolConfig::default(),
            frontier: FrontierConfig::default(),
            seeds: Vec::new(),
        }
    }
}
