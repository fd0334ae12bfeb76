//! Frontier tracking
//!
//! The frontier is never held as an in-memory queue of its own: every batch
//! is re-derived from persisted crawl state, so a run that was interrupted
//! resumes from whatever was last committed. The only in-memory state is the
//! set of posts already attempted during this run, which keeps a post whose
//! crawl failed (or was deferred) from being retried in a tight loop.

use crate::config::CrawlerConfig;
use crate::storage::{FrontierEntry, PostStore, StorageResult};
use std::collections::HashSet;

/// Which part of the store a traversal covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontierScope {
    /// Every pending post in the store
    All,
    /// Pending posts in the subtree under `root`, at most `max_depth` below it
    Subtree {
        root: String,
        max_depth: Option<u32>,
    },
}

/// Produces ordered batches of posts awaiting a crawl
#[derive(Debug)]
pub struct Frontier {
    scope: FrontierScope,
    max_failed_attempts: u32,
    batch_size: usize,
    attempted: HashSet<String>,
}

impl Frontier {
    pub fn new(scope: FrontierScope, config: &CrawlerConfig) -> Self {
        Self {
            scope,
            max_failed_attempts: config.max_failed_attempts,
            batch_size: config.batch_size.max(1),
            attempted: HashSet::new(),
        }
    }

    /// Returns the next batch in breadth-first discovery order
    ///
    /// An empty batch means the frontier is drained for this run.
    pub fn next_batch<S: PostStore + ?Sized>(&self, store: &S) -> StorageResult<Vec<FrontierEntry>> {
        let candidates = match &self.scope {
            FrontierScope::All => store.frontier_candidates(self.max_failed_attempts)?,
            FrontierScope::Subtree { root, max_depth } => {
                store.subtree_frontier_candidates(root, *max_depth, self.max_failed_attempts)?
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|entry| !self.attempted.contains(&entry.uri))
            .take(self.batch_size)
            .collect())
    }

    /// Records that a post has been attempted in this run
    pub fn mark_attempted(&mut self, uri: &str) {
        self.attempted.insert(uri.to_string());
    }

    pub fn attempted_count(&self) -> usize {
        self.attempted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewPost, SqliteStorage};

    fn post(uri: &str, quote_count: u64) -> NewPost {
        NewPost {
            uri: uri.to_string(),
            cid: None,
            author_did: None,
            author_handle: "someone.test".to_string(),
            author_display_name: None,
            text: String::new(),
            created_at: None,
            indexed_at: None,
            like_count: 0,
            quote_count,
            repost_count: 0,
            reply_count: 0,
            parent_uri: None,
            embed_type: None,
            media: None,
        }
    }

    fn config(batch_size: usize) -> CrawlerConfig {
        CrawlerConfig {
            batch_size,
            max_failed_attempts: 2,
            ..CrawlerConfig::default()
        }
    }

    fn seeded_store() -> SqliteStorage {
        let mut store = SqliteStorage::new_in_memory().unwrap();
        store.upsert_post(&post("R", 3), None).unwrap();
        store
            .record_quote_page("R", &[post("A", 1), post("B", 0), post("C", 0)], None)
            .unwrap();
        store
    }

    #[test]
    fn test_batches_skip_attempted() {
        let store = seeded_store();
        let mut frontier = Frontier::new(FrontierScope::All, &config(2));

        let batch = frontier.next_batch(&store).unwrap();
        let uris: Vec<_> = batch.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["R", "A"]);

        frontier.mark_attempted("R");
        frontier.mark_attempted("A");
        let batch = frontier.next_batch(&store).unwrap();
        let uris: Vec<_> = batch.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, vec!["B", "C"]);
        assert_eq!(frontier.attempted_count(), 2);
    }

    #[test]
    fn test_drained_when_everything_crawled() {
        let mut store = seeded_store();
        for uri in ["R", "A", "B", "C"] {
            store.mark_crawled(uri, 0).unwrap();
        }
        let frontier = Frontier::new(FrontierScope::All, &config(10));
        assert!(frontier.next_batch(&store).unwrap().is_empty());
    }

    #[test]
    fn test_subtree_scope() {
        let mut store = seeded_store();
        store.upsert_post(&post("X", 0), None).unwrap();

        let frontier = Frontier::new(
            FrontierScope::Subtree {
                root: "R".to_string(),
                max_depth: Some(0),
            },
            &config(10),
        );
        let batch = frontier.next_batch(&store).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].uri, "R");
    }

    #[test]
    fn test_failed_posts_drop_out_at_cap() {
        let mut store = seeded_store();
        store.mark_failed("B", "boom").unwrap();
        store.mark_failed("B", "boom").unwrap();

        let frontier = Frontier::new(FrontierScope::All, &config(10));
        let batch = frontier.next_batch(&store).unwrap();
        assert!(batch.iter().all(|e| e.uri != "B"));
    }
}
