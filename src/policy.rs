//! The crawl policy boundary
//!
//! [`CrawlPolicy`] is how the embedding application steers a crawl: it is
//! asked whether discovered links are worth following, receives page
//! content, and is notified of additions and failures. Every method has a
//! default implementation, so embedders override only what they need.

use crate::crawler::{LinkExtractor, SpiderHandle};
use url::Url;

/// The kinds of link the extractor can encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Navigational link (anchor or frame)
    Hyperlink,
    /// Image reference
    Image,
    /// Stylesheet reference
    Stylesheet,
    /// Script reference
    Script,
}

/// Severity of a reported per-URL failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Expected, non-fatal (network and transport failures)
    Info,
    /// Bookkeeping problems (e.g. a terminal status could not be recorded)
    Warning,
    /// Unexpected processing failures; the crawl still continues
    Severe,
}

/// Collaborator that decides which links to follow and receives
/// processing and error notifications.
///
/// No failure reported through this trait aborts the crawl: once crawling
/// has started there is deliberately no fatal path.
pub trait CrawlPolicy: Send + Sync {
    /// Called once after the spider finishes initialization, before any
    /// work begins.
    fn initialized(&self, spider: &SpiderHandle) {
        let _ = spider;
    }

    /// Admission gate for discovered links. Returning false drops the
    /// candidate silently before it reaches the frontier.
    fn url_found(&self, url: &Url, source: &Url, kind: LinkKind) -> bool {
        let _ = (url, source, kind);
        true
    }

    /// Called after a URL was successfully inserted into the frontier.
    fn url_added(&self, url: &Url, source: Option<&Url>) {
        let _ = (url, source);
    }

    /// Non-HTML content delivery: the fetched body as an opaque byte
    /// stream.
    fn url_process_data(&self, url: &Url, data: &[u8]) -> anyhow::Result<()> {
        let _ = (url, data);
        Ok(())
    }

    /// HTML content delivery. The policy is expected to drive the
    /// extractor to exhaustion (the default does exactly that); link
    /// discovery happens as a side effect of [`LinkExtractor::read_all`].
    fn url_process_html(&self, url: &Url, page: &mut LinkExtractor<'_>) -> anyhow::Result<()> {
        let _ = url;
        page.read_all()
    }

    /// Failure notification for a single URL.
    fn url_error(&self, url: &Url, description: &str, severity: ErrorSeverity) {
        let _ = (url, description, severity);
    }
}

/// A policy that follows every admissible link and ignores content.
pub struct FollowAll;

impl CrawlPolicy for FollowAll {}
