//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the forward traversal that coordinates all aspects of
//! a crawl, including:
//! - Seeding the store with the root post
//! - Pulling frontier batches derived from persisted state
//! - Draining each node's quote pages in cursor order
//! - Isolating per-node failures
//! - Handling interrupts and time bounds at page boundaries

use crate::api::{PostUri, QuoteApi};
use crate::config::Config;
use crate::crawler::frontier::{Frontier, FrontierScope};
use crate::crawler::Interrupt;
use crate::state::CrawlState;
use crate::storage::{FrontierEntry, PostStore, RunKind, RunStatus, SqliteStorage};
use crate::{QuoteTreeError, Result};
use std::time::{Duration, Instant};

/// Lifecycle of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalPhase {
    Seeded,
    Running,
    Drained,
}

/// Why a traversal stopped before its frontier drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    TimeLimit,
}

/// Summary of a forward traversal
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub phase: TraversalPhase,
    pub stop_reason: Option<StopReason>,
    /// Nodes whose quotes were fully enumerated
    pub nodes_crawled: u64,
    /// Nodes marked CRAWL_FAILED in this run
    pub nodes_failed: u64,
    /// Nodes left untouched after a store integrity violation
    pub nodes_deferred: u64,
    pub pages_fetched: u64,
    /// Posts new to the store
    pub posts_discovered: u64,
    /// Missing ancestors of the seed fetched before the traversal
    pub ancestors_fetched: u64,
    /// Posts that have exhausted their retries
    pub permanently_failed: Vec<String>,
}

impl CrawlReport {
    pub(crate) fn new() -> Self {
        Self {
            phase: TraversalPhase::Seeded,
            stop_reason: None,
            nodes_crawled: 0,
            nodes_failed: 0,
            nodes_deferred: 0,
            pages_fetched: 0,
            posts_discovered: 0,
            ancestors_fetched: 0,
            permanently_failed: Vec::new(),
        }
    }

    /// Run status to record for this traversal
    pub fn run_status(&self) -> RunStatus {
        if self.stop_reason.is_some() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        }
    }
}

/// Result of walking every quote page of one post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageWalk {
    /// The listing was drained
    Complete { listed: u64, inserted: u64 },
    /// A stop was requested between pages; the node is not finished
    Stopped(StopReason),
}

/// Main crawler coordinator structure
///
/// Owns the API client and the store for the duration of one command.
pub struct Coordinator<A: QuoteApi> {
    pub(crate) api: A,
    pub(crate) storage: SqliteStorage,
    pub(crate) config: Config,
    config_hash: String,
    interrupt: Interrupt,
    deadline: Option<Instant>,
}

impl<A: QuoteApi> Coordinator<A> {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `api` - Client for the remote service
    /// * `storage` - The post store
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration, recorded on each run
    pub fn new(api: A, storage: SqliteStorage, config: Config, config_hash: String) -> Self {
        Self {
            api,
            storage,
            config,
            config_hash,
            interrupt: Interrupt::new(),
            deadline: None,
        }
    }

    /// Uses a shared interrupt flag instead of a private one
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn into_storage(self) -> SqliteStorage {
        self.storage
    }

    /// Crawls every quote of `seed`, transitively
    ///
    /// `seed` may be any accepted post identifier form. The seed is fetched
    /// and stored if it is not already known. The traversal is limited to
    /// the seed's subtree and to `max-depth` levels below it.
    pub async fn crawl(&mut self, seed: &str) -> Result<CrawlReport> {
        let parsed = PostUri::parse(seed)?;
        let root = self.api.resolve_post_uri(&parsed).await?;

        let run_id = self.begin_run(RunKind::Crawl)?;
        let result = self.crawl_from(&root, run_id).await;
        self.end_run(run_id, result.as_ref().map(CrawlReport::run_status))?;
        result
    }

    async fn crawl_from(&mut self, root: &str, run_id: i64) -> Result<CrawlReport> {
        let parent = match self.storage.get_post(root)? {
            Some(seed) => seed.parent_uri,
            None => {
                tracing::info!("Fetching seed post {}", root);
                let post = self.api.fetch_post(root).await?;
                self.storage.upsert_post(&post.to_new_post(), Some(run_id))?;
                post.quoted_uri
            }
        };

        let mut report = CrawlReport::new();

        // A seed that quotes another post must not point at a missing parent
        if let Some(parent) = parent {
            if self.storage.get_post(&parent)?.is_none() {
                tracing::info!("Seed {} quotes {}, fetching its ancestors", root, parent);
                let repair = self.fetch_missing_ancestors(vec![parent], run_id).await?;
                report.ancestors_fetched = repair.fetched;
                if let Some(reason) = repair.stop_reason {
                    report.stop_reason = Some(reason);
                    return Ok(report);
                }
            }
        }

        let mut frontier = Frontier::new(
            FrontierScope::Subtree {
                root: root.to_string(),
                max_depth: self.config.crawler.max_depth,
            },
            &self.config.crawler,
        );
        self.drain(&mut frontier, run_id, &mut report).await?;
        Ok(report)
    }

    /// Crawls every pending post in the store
    ///
    /// This is also how an interrupted run is resumed.
    pub async fn crawl_all(&mut self) -> Result<CrawlReport> {
        let run_id = self.begin_run(RunKind::CrawlAll)?;
        let mut frontier = Frontier::new(FrontierScope::All, &self.config.crawler);
        let mut report = CrawlReport::new();
        let result = self
            .drain(&mut frontier, run_id, &mut report)
            .await
            .map(|()| report);
        self.end_run(run_id, result.as_ref().map(CrawlReport::run_status))?;
        result
    }

    pub(crate) fn begin_run(&mut self, kind: RunKind) -> Result<i64> {
        self.deadline = self
            .config
            .crawler
            .max_run_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let run_id = self.storage.create_run(kind, &self.config_hash)?;
        tracing::info!("Starting {} run {}", kind.to_db_string(), run_id);
        Ok(run_id)
    }

    /// Records how a run ended; errors are recorded as a failed run
    pub(crate) fn end_run(
        &mut self,
        run_id: i64,
        status: std::result::Result<RunStatus, &QuoteTreeError>,
    ) -> Result<()> {
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Run {} failed: {}", run_id, e);
                RunStatus::Failed
            }
        };
        self.storage.finish_run(run_id, status)?;
        Ok(())
    }

    pub(crate) fn stop_reason(&self) -> Option<StopReason> {
        if self.interrupt.is_triggered() {
            Some(StopReason::Interrupted)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }

    /// Runs the traversal loop until the frontier is empty or a stop is requested
    pub(crate) async fn drain(
        &mut self,
        frontier: &mut Frontier,
        run_id: i64,
        report: &mut CrawlReport,
    ) -> Result<()> {
        report.phase = TraversalPhase::Running;
        let start_time = Instant::now();
        let mut nodes_visited: u64 = 0;

        'batches: loop {
            let batch = frontier.next_batch(&self.storage)?;
            if batch.is_empty() {
                report.phase = TraversalPhase::Drained;
                break;
            }

            for entry in batch {
                if let Some(reason) = self.stop_reason() {
                    tracing::info!("Stopping traversal: {:?}", reason);
                    report.stop_reason = Some(reason);
                    break 'batches;
                }

                frontier.mark_attempted(&entry.uri);
                match self.crawl_node(&entry, run_id, report).await {
                    Ok(None) => report.nodes_crawled += 1,
                    Ok(Some(reason)) => {
                        tracing::info!("Stopping traversal mid-node at {}: {:?}", entry.uri, reason);
                        report.stop_reason = Some(reason);
                        break 'batches;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(QuoteTreeError::Storage(e)) => {
                        tracing::warn!("Deferring {}: {}", entry.uri, e);
                        report.nodes_deferred += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to crawl {}: {}", entry.uri, e);
                        self.storage.mark_failed(&entry.uri, &e.to_string())?;
                        report.nodes_failed += 1;
                    }
                }

                nodes_visited += 1;
                if nodes_visited % 10 == 0 {
                    let rate = nodes_visited as f64 / start_time.elapsed().as_secs_f64();
                    tracing::info!(
                        "Progress: {} nodes visited, {} new posts, {:.2} nodes/sec",
                        nodes_visited,
                        report.posts_discovered,
                        rate
                    );
                }
            }
        }

        report.permanently_failed = self
            .storage
            .permanently_failed(self.config.crawler.max_failed_attempts)?
            .into_iter()
            .map(|p| p.uri)
            .collect();
        for uri in &report.permanently_failed {
            tracing::warn!("Giving up on {} after repeated failures", uri);
        }

        tracing::info!(
            "Traversal {:?}: {} crawled, {} failed, {} deferred, {} new posts in {:?}",
            report.phase,
            report.nodes_crawled,
            report.nodes_failed,
            report.nodes_deferred,
            report.posts_discovered,
            start_time.elapsed()
        );
        Ok(())
    }

    /// Crawls one frontier node, returning a stop reason if it was cut short
    async fn crawl_node(
        &mut self,
        entry: &FrontierEntry,
        run_id: i64,
        report: &mut CrawlReport,
    ) -> Result<Option<StopReason>> {
        if self.config.crawler.skip_zero_quote_count
            && entry.quote_count == 0
            && entry.crawl_state == CrawlState::Uncrawled
        {
            tracing::debug!("{} has no quotes, marking crawled", entry.uri);
            self.storage.mark_crawled(&entry.uri, 0)?;
            return Ok(None);
        }

        tracing::debug!(
            "Crawling {} (depth {:?}, {} quotes expected)",
            entry.uri,
            entry.depth,
            entry.quote_count
        );
        match self.walk_quote_pages(&entry.uri, run_id, report).await? {
            PageWalk::Complete { listed, .. } => {
                self.storage
                    .mark_crawled(&entry.uri, entry.quote_count.max(listed))?;
                Ok(None)
            }
            PageWalk::Stopped(reason) => Ok(Some(reason)),
        }
    }

    /// Fetches every quote page of `uri` in cursor order, committing each page
    pub(crate) async fn walk_quote_pages(
        &mut self,
        uri: &str,
        run_id: i64,
        report: &mut CrawlReport,
    ) -> Result<PageWalk> {
        let mut cursor: Option<String> = None;
        let mut listed = 0;
        let mut inserted = 0;

        loop {
            let page = self.api.fetch_quotes_page(uri, cursor.as_deref()).await?;
            report.pages_fetched += 1;

            let children: Vec<_> = page.posts.iter().map(|p| p.to_new_post()).collect();
            for child in &children {
                if child.parent_uri.as_deref().is_some_and(|p| p != uri) {
                    tracing::debug!(
                        "{} listed as a quote of {} but embeds {:?}",
                        child.uri,
                        uri,
                        child.parent_uri
                    );
                }
            }
            let outcome = self
                .storage
                .record_quote_page(uri, &children, Some(run_id))?;
            listed += children.len() as u64;
            inserted += outcome.inserted as u64;
            report.posts_discovered += outcome.inserted as u64;

            let next = match page.cursor {
                Some(next) if !page.posts.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    next
                }
                _ => return Ok(PageWalk::Complete { listed, inserted }),
            };

            if let Some(reason) = self.stop_reason() {
                return Ok(PageWalk::Stopped(reason));
            }
            cursor = Some(next);
        }
    }
}
