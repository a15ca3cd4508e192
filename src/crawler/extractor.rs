//! Streaming HTML link extraction
//!
//! [`LinkExtractor`] wraps one fetched HTML page. Driving it with
//! [`read_all`](LinkExtractor::read_all) scans the markup in document
//! order, resolves every reference against the page's base URL (which a
//! `<base href>` tag may move mid-document), filters out non-navigable
//! and non-crawlable candidates, and submits the survivors through the
//! policy's admission gate.

use crate::crawler::spider::SpiderShared;
use crate::frontier::WorkRecord;
use crate::policy::LinkKind;
use anyhow::Context;
use scraper::{ElementRef, Html};
use url::Url;

/// One fetched HTML page, ready to be scanned for links
pub struct LinkExtractor<'a> {
    shared: &'a SpiderShared,
    work: &'a WorkRecord,
    base: Url,
    body: String,
}

impl<'a> LinkExtractor<'a> {
    pub(crate) fn new(
        shared: &'a SpiderShared,
        work: &'a WorkRecord,
        base: Url,
        body: String,
    ) -> Self {
        Self {
            shared,
            work,
            base,
            body,
        }
    }

    /// The URL all relative references resolve against. Starts as the
    /// final fetch URL; updated when a scan encounters `<base href>`.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The raw page markup.
    pub fn html(&self) -> &str {
        &self.body
    }

    /// Scans the whole page, submitting every admissible link.
    ///
    /// Candidates the policy declines are dropped silently; duplicates
    /// are absorbed by the frontier. Fails only when the frontier itself
    /// fails.
    pub fn read_all(&mut self) -> anyhow::Result<()> {
        let outcome = scan(&self.body, self.base.clone());
        self.base = outcome.base;
        for candidate in outcome.candidates {
            if self
                .shared
                .policy
                .url_found(&candidate.url, &self.work.url, candidate.kind)
            {
                self.shared
                    .add_url(&candidate.url, Some(self.work))
                    .with_context(|| format!("failed to add {}", candidate.url))?;
            }
        }
        Ok(())
    }
}

struct Candidate {
    url: Url,
    kind: LinkKind,
}

struct ScanOutcome {
    candidates: Vec<Candidate>,
    base: Url,
}

/// Walks the markup in document order, collecting resolvable candidates.
fn scan(body: &str, initial_base: Url) -> ScanOutcome {
    let document = Html::parse_document(body);
    let mut base = initial_base;
    let mut candidates = Vec::new();

    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        match element.value().name() {
            "a" => {
                if let Some(href) = element.attr("href").and_then(navigable_href) {
                    push_candidate(&mut candidates, &base, href, LinkKind::Hyperlink);
                }
            }
            "img" => {
                if let Some(src) = element.attr("src") {
                    push_candidate(&mut candidates, &base, src, LinkKind::Image);
                }
            }
            "link" => {
                if let Some(href) = element.attr("href") {
                    push_candidate(&mut candidates, &base, href, classify_link_rel(href));
                }
            }
            "script" => {
                if let Some(src) = element.attr("src") {
                    push_candidate(&mut candidates, &base, src, LinkKind::Script);
                }
            }
            "frame" => {
                if let Some(src) = element.attr("src") {
                    push_candidate(&mut candidates, &base, src, LinkKind::Hyperlink);
                }
            }
            "base" => {
                if let Some(href) = element.attr("href") {
                    if let Ok(new_base) = base.join(href.trim()) {
                        tracing::debug!("base moved to {}", new_base);
                        base = new_base;
                    }
                }
            }
            _ => {}
        }
    }

    ScanOutcome { candidates, base }
}

/// Filters anchor hrefs down to ones that actually navigate somewhere
fn navigable_href(href: &str) -> Option<&str> {
    let href = href.trim();
    if href.is_empty() || contains_invalid_url_characters(href) {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    const NON_NAVIGABLE: &[&str] = &["javascript:", "mailto:", "news:", "irc:", "rtsp:", "rstp:"];
    if NON_NAVIGABLE.iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    Some(href)
}

/// `<link>` targets are classified by file extension: icons count as
/// images, stylesheets as styles, and anything else as script-like.
fn classify_link_rel(href: &str) -> LinkKind {
    let lower = href.trim().to_ascii_lowercase();
    if lower.ends_with(".ico") {
        LinkKind::Image
    } else if lower.ends_with(".css") {
        LinkKind::Stylesheet
    } else {
        LinkKind::Script
    }
}

fn push_candidate(candidates: &mut Vec<Candidate>, base: &Url, raw: &str, kind: LinkKind) {
    let raw = raw.trim();
    if raw.is_empty() || contains_invalid_url_characters(raw) {
        return;
    }
    let Ok(mut url) = base.join(raw) else {
        tracing::debug!("unresolvable reference dropped: {}", raw);
        return;
    };
    // Fragments never change the fetched resource.
    url.set_fragment(None);
    if !matches!(url.scheme(), "http" | "https" | "file") {
        return;
    }
    candidates.push(Candidate { url, kind });
}

fn contains_invalid_url_characters(s: &str) -> bool {
    s.chars().any(|c| {
        c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '[' | ']' | '`')
    })
}
