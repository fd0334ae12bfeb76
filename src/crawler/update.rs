//! Incremental update pass
//!
//! Re-checks CRAWLED posts for new quotes without re-walking the whole tree.
//! A post is only re-listed when its freshly fetched quote count differs
//! from the count recorded at its last crawl, or when no count is available.
//! A count that is wrong in the remote service can therefore delay an
//! update; it cannot remove anything, since edges are only ever added.

use crate::api::QuoteApi;
use crate::crawler::coordinator::PageWalk;
use crate::crawler::frontier::{Frontier, FrontierScope};
use crate::crawler::{Coordinator, CrawlReport, StopReason};
use crate::storage::{PostRecord, PostStore, RunKind, RunStatus, StalePolicy};
use crate::Result;

/// Summary of an update pass
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// CRAWLED posts whose quote count was checked
    pub checked: u64,
    /// Posts skipped because their quote count had not changed
    pub unchanged: u64,
    /// Posts whose quotes were listed again
    pub recrawled: u64,
    /// Posts that are no longer available remotely
    pub vanished: u64,
    /// Re-listings that failed; the post stays CRAWLED for the next pass
    pub failed: u64,
    /// Children new to the store found by re-listing
    pub new_posts: u64,
    /// Missing parents (and their ancestors) fetched into the store
    pub ancestors_fetched: u64,
    /// Parent chains that still end in a post the service cannot return
    pub unresolved_parents: u64,
    pub stop_reason: Option<StopReason>,
    /// The crawl of newly discovered posts that follows the re-check
    pub drain: CrawlReport,
}

impl UpdateReport {
    pub fn run_status(&self) -> RunStatus {
        if self.stop_reason.is_some() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        }
    }
}

enum Recheck {
    Unchanged,
    Vanished,
    Relisted { new_posts: u64 },
    Failed,
    Stopped(StopReason),
}

impl<A: QuoteApi> Coordinator<A> {
    /// Re-checks stale CRAWLED posts, then crawls whatever was discovered
    pub async fn update(&mut self) -> Result<UpdateReport> {
        let run_id = self.begin_run(RunKind::Update)?;
        let result = self.update_run(run_id).await;
        self.end_run(run_id, result.as_ref().map(UpdateReport::run_status))?;
        result
    }

    async fn update_run(&mut self, run_id: i64) -> Result<UpdateReport> {
        let policy = StalePolicy::older_than_minutes(self.config.update.min_age_minutes);
        let stale = self.storage.get_stale(&policy)?;
        tracing::info!("Re-checking {} crawled posts", stale.len());

        let mut report = UpdateReport {
            checked: 0,
            unchanged: 0,
            recrawled: 0,
            vanished: 0,
            failed: 0,
            new_posts: 0,
            ancestors_fetched: 0,
            unresolved_parents: 0,
            stop_reason: None,
            drain: CrawlReport::new(),
        };

        for post in &stale {
            if let Some(reason) = self.stop_reason() {
                report.stop_reason = Some(reason);
                break;
            }

            report.checked += 1;
            match self.recheck(post, run_id, &mut report.drain).await? {
                Recheck::Unchanged => report.unchanged += 1,
                Recheck::Vanished => report.vanished += 1,
                Recheck::Relisted { new_posts } => {
                    report.recrawled += 1;
                    report.new_posts += new_posts;
                }
                Recheck::Failed => report.failed += 1,
                Recheck::Stopped(reason) => {
                    report.stop_reason = Some(reason);
                    break;
                }
            }

            if report.checked % 10 == 0 {
                tracing::info!(
                    "Progress: {}/{} checked, {} re-listed, {} new posts",
                    report.checked,
                    stale.len(),
                    report.recrawled,
                    report.new_posts
                );
            }
        }

        if report.stop_reason.is_none() {
            let missing = self.storage.dangling_parent_uris()?;
            if !missing.is_empty() {
                tracing::info!("Fetching {} missing parents", missing.len());
                let repair = self.fetch_missing_ancestors(missing, run_id).await?;
                report.ancestors_fetched = repair.fetched;
                report.unresolved_parents = repair.unresolved;
                report.stop_reason = repair.stop_reason;
            }
        }

        if report.stop_reason.is_none() {
            let mut frontier = Frontier::new(FrontierScope::All, &self.config.crawler);
            self.drain(&mut frontier, run_id, &mut report.drain).await?;
            report.stop_reason = report.drain.stop_reason;
        }

        tracing::info!(
            "Update finished: {} checked, {} unchanged, {} re-listed, {} vanished, {} failed, {} new posts, {} ancestors fetched",
            report.checked,
            report.unchanged,
            report.recrawled,
            report.vanished,
            report.failed,
            report.new_posts,
            report.ancestors_fetched
        );
        Ok(report)
    }

    async fn recheck(
        &mut self,
        post: &PostRecord,
        run_id: i64,
        walk_report: &mut CrawlReport,
    ) -> Result<Recheck> {
        let current = match self.api.fetch_post(&post.uri).await {
            Ok(remote) => {
                self.storage
                    .upsert_post(&remote.to_new_post(), Some(run_id))?;
                remote.quote_count
            }
            Err(e) if e.is_auth() => return Err(e.into()),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} is no longer available", post.uri);
                return Ok(Recheck::Vanished);
            }
            Err(e) => {
                tracing::warn!("No fresh quote count for {}: {}", post.uri, e);
                None
            }
        };

        if let (Some(current), Some(seen)) = (current, post.last_seen_quote_count) {
            if current == seen {
                return Ok(Recheck::Unchanged);
            }
            tracing::debug!("{} quote count changed {} -> {}", post.uri, seen, current);
        }

        match self.walk_quote_pages(&post.uri, run_id, walk_report).await {
            Ok(PageWalk::Complete { listed, inserted }) => {
                // Compare against the service's own count next time
                self.storage
                    .mark_crawled(&post.uri, current.unwrap_or(listed))?;
                Ok(Recheck::Relisted {
                    new_posts: inserted,
                })
            }
            Ok(PageWalk::Stopped(reason)) => Ok(Recheck::Stopped(reason)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!("Re-listing {} failed, will retry next update: {}", post.uri, e);
                Ok(Recheck::Failed)
            }
        }
    }
}
