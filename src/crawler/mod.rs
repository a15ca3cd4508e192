//! The crawl engine: scheduler, worker pool, and link extraction

mod dispatcher;
mod extractor;
mod spider;
mod worker;

pub use extractor::LinkExtractor;
pub use spider::{CrawlSummary, Spider, SpiderHandle};

use crate::config::Config;
use crate::policy::CrawlPolicy;
use crate::SpiderError;
use std::sync::Arc;

/// Runs a complete crawl: build a spider from the configuration, crawl
/// until the frontier is exhausted, and return the summary.
pub async fn crawl(
    config: Config,
    policy: Arc<dyn CrawlPolicy>,
) -> Result<CrawlSummary, SpiderError> {
    Spider::new(config, policy)?.run().await
}
