//! Storage module for persisting the quote tree
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent post upserts and per-page transactional commits
//! - Per-post crawl state and crawl metadata
//! - Frontier derivation from persisted state
//! - Run tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{PostStore, StorageError, StorageResult};

use crate::api::MediaLink;
use crate::state::CrawlState;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, StorageError> {
    SqliteStorage::new(path)
}

/// Opens an existing storage database for reading only
pub fn open_storage_read_only(path: &Path) -> Result<SqliteStorage, StorageError> {
    SqliteStorage::open_read_only(path)
}

/// Formats a timestamp the way every stored timestamp is formatted
///
/// Fixed-width UTC with millisecond precision, so stored timestamps compare
/// correctly as strings.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time as a stored timestamp
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// A post as observed from the remote API, ready to be upserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: Option<String>,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub text: String,
    pub created_at: Option<String>,
    pub indexed_at: Option<String>,
    pub like_count: u64,
    pub quote_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    /// The post this one quotes (None only for the tree root)
    pub parent_uri: Option<String>,
    pub embed_type: Option<String>,
    pub media: Option<MediaLink>,
}

/// Represents a post row in the database
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: i64,
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: Option<String>,
    pub author_handle: String,
    pub author_display_name: Option<String>,
    pub text: String,
    pub created_at: Option<String>,
    pub indexed_at: Option<String>,
    pub like_count: u64,
    /// Quote-count hint from the most recent observation (may be stale)
    pub quote_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub parent_uri: Option<String>,
    pub embed_type: Option<String>,
    pub media: Option<MediaLink>,
    pub crawl_state: CrawlState,
    /// Number of failed attempts to list this post's quotes
    pub crawl_attempts: u32,
    pub last_error: Option<String>,
    pub discovered_at: String,
    pub discovered_run: Option<i64>,
    pub last_crawled_at: Option<String>,
    /// Quote count recorded when the post was last marked crawled
    pub last_seen_quote_count: Option<u64>,
}

/// A post awaiting a crawl, as produced for the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub uri: String,
    /// Depth below the subtree root, when the entry came from a subtree query
    pub depth: Option<u32>,
    pub crawl_state: CrawlState,
    pub crawl_attempts: u32,
    pub quote_count: u64,
}

/// Result of committing one page of quote results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Children that were new to the store
    pub inserted: usize,
    /// Children that already existed and were only refreshed
    pub refreshed: usize,
}

/// Threshold policy for selecting crawled posts worth re-checking
#[derive(Debug, Clone, Copy)]
pub struct StalePolicy {
    /// Only posts last crawled at least this long ago are stale
    pub min_age: Duration,
}

impl StalePolicy {
    /// Every crawled post is stale
    pub fn all() -> Self {
        Self {
            min_age: Duration::zero(),
        }
    }

    /// Posts last crawled at least `minutes` ago are stale
    pub fn older_than_minutes(minutes: u64) -> Self {
        Self {
            min_age: Duration::minutes(minutes as i64),
        }
    }

    /// The latest `last_crawled_at` that still counts as stale
    pub fn cutoff(&self, now: DateTime<Utc>) -> String {
        format_timestamp(now - self.min_age)
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub kind: RunKind,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Which command started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Trace,
    Crawl,
    CrawlAll,
    Update,
}

impl RunKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Crawl => "crawl",
            Self::CrawlAll => "crawl_all",
            Self::Update => "update",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "trace" => Some(Self::Trace),
            "crawl" => Some(Self::Crawl),
            "crawl_all" => Some(Self::CrawlAll),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_status_roundtrip() {
        for status in &[
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Interrupted,
            RunStatus::Failed,
        ] {
            assert_eq!(
                Some(*status),
                RunStatus::from_db_string(status.to_db_string())
            );
        }
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_run_kind_parse() {
        assert_eq!(RunKind::from_db_string("crawl_all"), Some(RunKind::CrawlAll));
        assert_eq!(RunKind::from_db_string("crawl-all"), None);
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = a + Duration::milliseconds(120);
        assert_eq!(format_timestamp(a), "2024-01-02T03:04:05.000Z");
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn test_stale_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(
            StalePolicy::older_than_minutes(30).cutoff(now),
            "2024-01-02T02:30:00.000Z"
        );
        assert_eq!(StalePolicy::all().cutoff(now), format_timestamp(now));
    }
}
