//! The scheduler: a single coordinating loop over frontier and pool
//!
//! One task owns the loop. All other parties (workers, external callers)
//! communicate with it exclusively through an event channel carrying
//! `{WorkAdded, TaskCompleted, Cancel, Wake}`. Buffered events make lost
//! wakeups impossible; re-evaluating the loop conditions on every event
//! makes spurious ones harmless. There is no process-wide mutable state:
//! everything is passed at construction.

use crate::config::Config;
use crate::crawler::dispatcher::Dispatcher;
use crate::crawler::worker;
use crate::frontier::{create_frontier, Frontier, FrontierError, WorkRecord, WorkStatus};
use crate::policy::CrawlPolicy;
use crate::SpiderError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Wakeup reasons delivered to the coordinating loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// A URL was successfully added to the frontier
    WorkAdded,
    /// A pool task finished (successfully or not)
    TaskCompleted,
    /// Cancellation was requested
    Cancel,
    /// Explicit nudge to re-evaluate
    Wake,
}

/// State shared between the coordinating loop, pool workers, and handles
pub(crate) struct SpiderShared {
    pub(crate) frontier: Arc<dyn Frontier>,
    pub(crate) policy: Arc<dyn CrawlPolicy>,
    pub(crate) client: Client,
    pub(crate) max_depth: i64,
    pub(crate) events: mpsc::UnboundedSender<Event>,
    pub(crate) cancelled: AtomicBool,
}

impl SpiderShared {
    /// Adds a URL for processing.
    ///
    /// Rejects silently (Ok(false)) when a maximum depth is configured
    /// and the computed depth would exceed it; otherwise delegates to the
    /// frontier. On successful insertion the policy is notified and the
    /// coordinating loop woken.
    pub(crate) fn add_url(
        &self,
        url: &Url,
        source: Option<&WorkRecord>,
    ) -> Result<bool, FrontierError> {
        if self.max_depth != -1 {
            if let Some(source) = source {
                if i64::from(source.depth) >= self.max_depth {
                    return Ok(false);
                }
            }
        }

        if self.frontier.add(url, source, WorkStatus::Waiting)? {
            self.policy.url_added(url, source.map(|s| &s.url));
            let _ = self.events.send(Event::WorkAdded);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.events.send(Event::Cancel);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cloneable handle for steering a running crawl from other tasks or
/// threads: link submission, cancellation, explicit wakeups.
#[derive(Clone)]
pub struct SpiderHandle {
    shared: Arc<SpiderShared>,
}

impl SpiderHandle {
    /// Submits a URL, applying the depth gate before frontier insertion.
    /// `source` is the record the URL was discovered on; None marks a
    /// seed at depth 0.
    pub fn add_url(&self, url: &Url, source: Option<&WorkRecord>) -> Result<bool, FrontierError> {
        self.shared.add_url(url, source)
    }

    /// Stops new submissions. In-flight fetches are never interrupted;
    /// the running crawl drains them and then returns. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Nudges the coordinating loop to re-evaluate.
    pub fn wake(&self) {
        let _ = self.shared.events.send(Event::Wake);
    }

    /// The frontier backing this crawl.
    pub fn frontier(&self) -> Arc<dyn Frontier> {
        self.shared.frontier.clone()
    }
}

/// Basic status information about a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl CrawlSummary {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

enum Decision {
    Finished,
    Wait,
}

/// The crawl engine: frontier, bounded pool, and coordinating loop
pub struct Spider {
    shared: Arc<SpiderShared>,
    events: mpsc::UnboundedReceiver<Event>,
    dispatcher: Dispatcher,
}

impl Spider {
    /// Builds a spider from configuration and a policy collaborator.
    ///
    /// Fails only on configuration problems: invalid values, an unknown
    /// frontier backend, or an unavailable database. Seed URLs from the
    /// configuration are inserted at depth 0; the policy's
    /// `initialized` hook runs first and may add seeds of its own.
    pub fn new(config: Config, policy: Arc<dyn CrawlPolicy>) -> Result<Self, SpiderError> {
        crate::config::validate(&config)?;
        let frontier = create_frontier(&config)?;
        let client = build_http_client(&config)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher::new(
            config.pool.max_size as usize,
            config.pool.queue_size as usize,
            Duration::from_secs(config.pool.shutdown_grace_secs),
            tx.clone(),
        );

        let shared = Arc::new(SpiderShared {
            frontier,
            policy,
            client,
            max_depth: config.crawler.max_depth,
            events: tx,
            cancelled: AtomicBool::new(false),
        });

        let spider = Self {
            shared,
            events: rx,
            dispatcher,
        };

        spider.shared.policy.initialized(&spider.handle());

        for seed in &config.seeds {
            let url = Url::parse(seed)?;
            if !spider.shared.add_url(&url, None)? {
                tracing::debug!("seed already present: {}", url);
            }
        }

        Ok(spider)
    }

    /// A handle usable from other tasks and threads.
    pub fn handle(&self) -> SpiderHandle {
        SpiderHandle {
            shared: self.shared.clone(),
        }
    }

    /// Runs the crawl to completion.
    ///
    /// Returns when the frontier is exhausted with no active workers, or
    /// after cancellation once every in-flight worker has drained. Worker
    /// failures never end the crawl; frontier faults inside the loop are
    /// logged and the loop continues best-effort.
    pub async fn run(mut self) -> Result<CrawlSummary, SpiderError> {
        let started_at = Utc::now();
        tracing::info!("spider running at {}", started_at.to_rfc3339());

        self.work_loop().await;
        tracing::info!(
            "EXIT: {}",
            if self.shared.is_cancelled() {
                "cancelled"
            } else {
                "work complete"
            }
        );
        self.drain().await;

        self.shared.frontier.shutdown();
        self.dispatcher.shutdown().await;

        let finished_at = Utc::now();
        tracing::info!("spider exiting at {}", finished_at.to_rfc3339());
        Ok(CrawlSummary {
            started_at,
            finished_at,
            cancelled: self.shared.is_cancelled(),
        })
    }

    async fn work_loop(&mut self) {
        loop {
            if self.shared.is_cancelled() {
                break;
            }
            match self.evaluate() {
                Decision::Finished => {
                    tracing::info!("spider finished: normal termination condition");
                    break;
                }
                Decision::Wait => {}
            }
            match self.events.recv().await {
                Some(Event::TaskCompleted) => self.dispatcher.reap(),
                Some(_) => {}
                // All senders gone: nothing can ever wake us again.
                None => break,
            }
        }
    }

    /// One pass of the coordination decision: submit as much claimable
    /// work as capacity allows, or detect normal termination.
    fn evaluate(&mut self) -> Decision {
        match self.shared.frontier.is_empty() {
            Ok(false) => {
                // Keep one slot of margin so a completion racing with
                // this loop can never push us past the pool bound.
                while self.dispatcher.remaining_capacity() > 1 {
                    match self.shared.frontier.get_work() {
                        Ok(Some(work)) => {
                            tracing::debug!("dispatching {}", work);
                            let shared = self.shared.clone();
                            self.dispatcher.submit(worker::process(shared, work));
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("frontier claim failed: {}", e);
                            break;
                        }
                    }
                }
                Decision::Wait
            }
            Ok(true) => {
                if self.dispatcher.active_count() == 0 {
                    Decision::Finished
                } else {
                    Decision::Wait
                }
            }
            Err(e) => {
                tracing::warn!("frontier empty-check failed: {}", e);
                Decision::Wait
            }
        }
    }

    /// Cooperative drain: wait until every previously-submitted worker
    /// has finished. Cancellation stops new submissions only.
    async fn drain(&mut self) {
        while self.dispatcher.active_count() > 0 {
            tracing::debug!(
                "waiting for {} stragglers",
                self.dispatcher.active_count()
            );
            match self.events.recv().await {
                Some(Event::TaskCompleted) => self.dispatcher.reap(),
                Some(_) => {}
                None => break,
            }
        }
    }
}

/// Builds the HTTP client used by all workers
fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(config.crawler.fetch_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(config.pool.keep_alive_secs))
        .gzip(true)
        .brotli(true);
    if let Some(user_agent) = &config.crawler.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }
    builder.build()
}
