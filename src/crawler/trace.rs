//! Reverse traversal from a post up to the tree root

use crate::api::{PostUri, QuoteApi};
use crate::crawler::{Coordinator, StopReason};
use crate::storage::{PostStore, RunKind, RunStatus};
use crate::Result;
use std::collections::HashSet;

/// How a trace ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    /// The last post in the chain has no parent
    ReachedRoot,
    /// An ancestor could not be resolved
    Gap { uri: String, reason: String },
}

/// Summary of a trace
#[derive(Debug, Clone)]
pub struct TraceReport {
    /// The starting post followed by each ancestor, nearest first
    pub chain: Vec<String>,
    /// Ancestors that had to be fetched from the remote service
    pub fetched: u64,
    pub outcome: TraceOutcome,
    pub stop_reason: Option<StopReason>,
}

impl TraceReport {
    /// The root post, if the trace reached it
    pub fn root(&self) -> Option<&str> {
        match self.outcome {
            TraceOutcome::ReachedRoot => self.chain.last().map(String::as_str),
            TraceOutcome::Gap { .. } => None,
        }
    }

    pub fn run_status(&self) -> RunStatus {
        if self.stop_reason.is_some() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        }
    }
}

/// Result of filling in parents that are missing from the store
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AncestorRepair {
    pub fetched: u64,
    /// Chains that still end in a parent the service could not return
    pub unresolved: u64,
    pub stop_reason: Option<StopReason>,
}

impl<A: QuoteApi> Coordinator<A> {
    /// Fetches each missing post in `missing` and the ancestors above it
    pub(crate) async fn fetch_missing_ancestors(
        &mut self,
        missing: Vec<String>,
        run_id: i64,
    ) -> Result<AncestorRepair> {
        let mut repair = AncestorRepair::default();

        for uri in missing {
            // An earlier chain may already have brought it in
            if self.storage.get_post(&uri)?.is_some() {
                continue;
            }

            let trace = self.trace_from(uri, run_id).await?;
            repair.fetched += trace.fetched;
            if trace.stop_reason.is_some() {
                repair.stop_reason = trace.stop_reason;
                break;
            }
            if let TraceOutcome::Gap { uri, reason } = &trace.outcome {
                tracing::warn!("Ancestor {} is still missing: {}", uri, reason);
                repair.unresolved += 1;
            }
        }

        Ok(repair)
    }

    /// Follows parent links upward from `start`, fetching missing ancestors
    ///
    /// An unresolvable ancestor ends the trace with a gap; only fatal errors
    /// are returned as errors.
    pub async fn trace(&mut self, start: &str) -> Result<TraceReport> {
        let parsed = PostUri::parse(start)?;
        let uri = self.api.resolve_post_uri(&parsed).await?;

        let run_id = self.begin_run(RunKind::Trace)?;
        let result = self.trace_from(uri, run_id).await;
        self.end_run(run_id, result.as_ref().map(TraceReport::run_status))?;
        result
    }

    pub(crate) async fn trace_from(&mut self, start: String, run_id: i64) -> Result<TraceReport> {
        let mut report = TraceReport {
            chain: Vec::new(),
            fetched: 0,
            outcome: TraceOutcome::ReachedRoot,
            stop_reason: None,
        };
        let mut seen = HashSet::new();
        let mut current = start;

        loop {
            if !seen.insert(current.clone()) {
                report.outcome = TraceOutcome::Gap {
                    uri: current,
                    reason: "parent chain loops back on itself".to_string(),
                };
                break;
            }

            if let Some(reason) = self.stop_reason() {
                report.stop_reason = Some(reason);
                report.outcome = TraceOutcome::Gap {
                    uri: current,
                    reason: format!("stopped: {:?}", reason),
                };
                break;
            }

            let parent = match self.storage.get_post(&current)? {
                Some(post) => {
                    tracing::info!("Already have {}", current);
                    post.parent_uri
                }
                None => match self.api.fetch_post(&current).await {
                    Ok(post) => {
                        tracing::info!(
                            "Fetched {} by {} ({} quotes, {} likes)",
                            current,
                            post.author_handle,
                            post.quote_count.unwrap_or(0),
                            post.like_count
                        );
                        self.storage
                            .upsert_post(&post.to_new_post(), Some(run_id))?;
                        report.fetched += 1;
                        post.quoted_uri
                    }
                    Err(e) if e.is_auth() => return Err(e.into()),
                    Err(e) => {
                        tracing::warn!("Trace stopped at {}: {}", current, e);
                        report.outcome = TraceOutcome::Gap {
                            uri: current,
                            reason: e.to_string(),
                        };
                        break;
                    }
                },
            };

            report.chain.push(current);
            match parent {
                Some(parent) => current = parent,
                None => {
                    report.outcome = TraceOutcome::ReachedRoot;
                    break;
                }
            }
        }

        tracing::info!(
            "Trace finished: chain of {}, {} fetched, {:?}",
            report.chain.len(),
            report.fetched,
            report.outcome
        );
        Ok(report)
    }
}
