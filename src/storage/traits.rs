//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::CrawlState;
use crate::storage::{
    FrontierEntry, NewPost, PageOutcome, PostRecord, RunKind, RunRecord, RunStatus, StalePolicy,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid state transition for {uri}: {from} -> {to}")]
    InvalidTransition {
        uri: String,
        from: CrawlState,
        to: CrawlState,
    },

    #[error("Store integrity violation: {0}")]
    Integrity(String),
}

impl StorageError {
    /// Returns true for integrity violations, which are deferred rather than fatal
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler. Posts
/// are keyed by their remote URI; the parent pointer on each post is the
/// tree edge.
pub trait PostStore {
    // ===== Run Management =====

    /// Creates a new run and returns its ID
    fn create_run(&mut self, kind: RunKind, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Records the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Post Management =====

    /// Inserts a post, or refreshes the engagement counts of an existing one
    ///
    /// Crawl state is never touched, so an existing CRAWLED post stays
    /// CRAWLED. An existing parent pointer is never replaced.
    ///
    /// # Returns
    ///
    /// `true` if the post was new to the store
    fn upsert_post(&mut self, post: &NewPost, run_id: Option<i64>) -> StorageResult<bool>;

    /// Commits one page of quote results for a parent in a single transaction
    ///
    /// Every child is upserted with `parent_uri` as its parent. Fails with
    /// `StorageError::Integrity` (committing nothing) if the parent is not in
    /// the store.
    fn record_quote_page(
        &mut self,
        parent_uri: &str,
        children: &[NewPost],
        run_id: Option<i64>,
    ) -> StorageResult<PageOutcome>;

    /// Marks a post CRAWLED and records the quote count seen for it
    fn mark_crawled(&mut self, uri: &str, quote_count_seen: u64) -> StorageResult<()>;

    /// Marks a post CRAWL_FAILED and increments its attempt counter
    ///
    /// Rejected with `StorageError::InvalidTransition` for CRAWLED posts.
    fn mark_failed(&mut self, uri: &str, error: &str) -> StorageResult<()>;

    /// Gets a post by URI
    fn get_post(&self, uri: &str) -> StorageResult<Option<PostRecord>>;

    /// Gets the direct quoting children of a post, in discovery order
    fn get_children(&self, uri: &str) -> StorageResult<Vec<PostRecord>>;

    /// Counts the direct quoting children of a post
    fn count_children(&self, uri: &str) -> StorageResult<u64>;

    /// Gets every UNCRAWLED or CRAWL_FAILED post, in discovery order
    fn get_uncrawled(&self) -> StorageResult<Vec<PostRecord>>;

    /// Gets CRAWLED posts due for a re-check, most-quoted first
    fn get_stale(&self, policy: &StalePolicy) -> StorageResult<Vec<PostRecord>>;

    // ===== Frontier Derivation =====

    /// Gets every post awaiting a crawl across the whole store
    ///
    /// CRAWL_FAILED posts are included only while their attempt count is
    /// below `max_failed_attempts`.
    fn frontier_candidates(&self, max_failed_attempts: u32) -> StorageResult<Vec<FrontierEntry>>;

    /// Gets posts awaiting a crawl within the subtree rooted at `root_uri`
    ///
    /// Entries are in breadth-first order (by depth, then discovery order)
    /// and no deeper than `max_depth` below the root.
    fn subtree_frontier_candidates(
        &self,
        root_uri: &str,
        max_depth: Option<u32>,
        max_failed_attempts: u32,
    ) -> StorageResult<Vec<FrontierEntry>>;

    /// Gets CRAWL_FAILED posts that have exhausted their retries
    fn permanently_failed(&self, max_failed_attempts: u32) -> StorageResult<Vec<PostRecord>>;

    // ===== Statistics =====

    /// Gets total post count
    fn count_total_posts(&self) -> StorageResult<u64>;

    /// Counts posts by crawl state
    fn count_posts_by_state(&self, state: CrawlState) -> StorageResult<u64>;

    /// Counts posts without a parent
    fn count_roots(&self) -> StorageResult<u64>;

    /// Counts posts whose parent pointer names a post that is not stored
    fn count_dangling_parents(&self) -> StorageResult<u64>;

    /// Gets the distinct parent URIs that name a post not in the store
    fn dangling_parent_uris(&self) -> StorageResult<Vec<String>>;

    /// Counts posts with a detected media link
    fn count_posts_with_media(&self) -> StorageResult<u64>;

    /// Length of the longest parent chain, in edges
    fn tree_depth(&self) -> StorageResult<u32>;

    /// Gets the most-quoted posts
    fn top_quoted(&self, limit: usize) -> StorageResult<Vec<PostRecord>>;

    /// Gets every (parent, child) edge whose parent is stored, sorted
    fn get_edges(&self) -> StorageResult<Vec<(String, String)>>;
}
