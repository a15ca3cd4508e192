//! Spinneret main entry point
//!
//! This is the command-line interface for the Spinneret web crawler.

use clap::Parser;
use spinneret::config::{load_config_with_hash, Config};
use spinneret::{crawl, CrawlPolicy, ErrorSeverity, LinkKind, SpiderHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Spinneret: a concurrent web crawler
///
/// Spinneret fetches pages starting from configured seed URLs, extracts
/// outbound links, and follows them under depth limits and bounded
/// concurrency, tracking every URL in an in-memory or SQLite frontier.
#[derive(Parser, Debug)]
#[command(name = "spinneret")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Discard durable frontier state from previous runs before starting
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else {
        handle_crawl(config, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spinneret=info,warn"),
            1 => EnvFilter::new("spinneret=debug,info"),
            2 => EnvFilter::new("spinneret=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    spinneret::config::validate(config)?;

    println!("=== Spinneret Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    if config.crawler.max_depth == -1 {
        println!("  Max depth: unlimited");
    } else {
        println!("  Max depth: {}", config.crawler.max_depth);
    }
    if let Some(user_agent) = &config.crawler.user_agent {
        println!("  User agent: {}", user_agent);
    }

    println!("\nWorker Pool:");
    println!("  Core size: {}", config.pool.core_size);
    println!("  Max size: {}", config.pool.max_size);
    println!("  Queue size: {}", config.pool.queue_size);
    println!("  Keep alive: {}s", config.pool.keep_alive_secs);

    println!("\nFrontier:");
    println!("  Backend: {}", config.frontier.backend);
    if config.frontier.backend == "sqlite" {
        println!("  Database: {}", config.frontier.database_path);
    }

    println!("\nSeed URLs ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    if fresh && config.frontier.backend == "sqlite" {
        let path = PathBuf::from(&config.frontier.database_path);
        if path.exists() {
            tracing::info!("Removing previous frontier database: {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }

    tracing::info!("Seed URLs: {}", config.seeds.len());

    match crawl(config, Arc::new(CliPolicy)).await {
        Ok(summary) => {
            if summary.cancelled {
                tracing::info!(
                    "Crawl cancelled after {}s",
                    summary.elapsed().num_seconds()
                );
            } else {
                tracing::info!(
                    "Crawl completed successfully in {}s",
                    summary.elapsed().num_seconds()
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

/// Policy used by the command-line crawler: follows every link and logs
/// progress.
struct CliPolicy;

impl CrawlPolicy for CliPolicy {
    fn initialized(&self, spider: &SpiderHandle) {
        let handle = spider.clone();
        // First Ctrl-C drains gracefully; a second one kills the process.
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, draining in-flight fetches");
                handle.cancel();
            }
        });
    }

    fn url_found(&self, url: &Url, _source: &Url, kind: LinkKind) -> bool {
        tracing::trace!("found {:?} link: {}", kind, url);
        true
    }

    fn url_added(&self, url: &Url, _source: Option<&Url>) {
        tracing::info!("queued {}", url);
    }

    fn url_error(&self, url: &Url, description: &str, severity: ErrorSeverity) {
        match severity {
            ErrorSeverity::Info => tracing::info!("{}: {}", url, description),
            ErrorSeverity::Warning => tracing::warn!("{}: {}", url, description),
            ErrorSeverity::Severe => tracing::error!("{}: {}", url, description),
        }
    }
}
