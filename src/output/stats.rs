//! Statistics generation from the post store
//!
//! This module provides functionality for extracting and displaying
//! quote-tree statistics from the storage layer. It never writes.

use crate::state::CrawlState;
use crate::storage::{PostRecord, PostStore, RunRecord, StorageResult};
use std::collections::HashMap;

/// Number of most-quoted posts included in the report
pub const TOP_QUOTED_LIMIT: usize = 10;

/// Quote-tree statistics summary
#[derive(Debug, Clone)]
pub struct TreeStatistics {
    /// Total number of posts stored
    pub total_posts: u64,

    /// Length of the longest parent chain, in edges
    pub tree_depth: u32,

    /// Count of posts by crawl state
    pub posts_by_state: HashMap<CrawlState, u64>,

    /// Posts without a parent
    pub roots: u64,

    /// Posts whose parent is not stored
    pub dangling_parents: u64,

    /// Posts with a detected media link
    pub posts_with_media: u64,

    /// CRAWL_FAILED posts that have exhausted their retries
    pub permanently_failed: Vec<PostRecord>,

    /// Most-quoted posts, highest first
    pub top_quoted: Vec<PostRecord>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl TreeStatistics {
    pub fn count_in_state(&self, state: CrawlState) -> u64 {
        self.posts_by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `max_failed_attempts` - Attempts after which a failed post counts as permanent
pub fn load_statistics(
    storage: &dyn PostStore,
    max_failed_attempts: u32,
) -> StorageResult<TreeStatistics> {
    let mut posts_by_state = HashMap::new();
    for state in CrawlState::all_states() {
        posts_by_state.insert(state, storage.count_posts_by_state(state)?);
    }

    Ok(TreeStatistics {
        total_posts: storage.count_total_posts()?,
        tree_depth: storage.tree_depth()?,
        posts_by_state,
        roots: storage.count_roots()?,
        dangling_parents: storage.count_dangling_parents()?,
        posts_with_media: storage.count_posts_with_media()?,
        permanently_failed: storage.permanently_failed(max_failed_attempts)?,
        top_quoted: storage.top_quoted(TOP_QUOTED_LIMIT)?,
        latest_run: storage.get_latest_run()?,
    })
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > 50 {
        format!("{}...", flat.chars().take(50).collect::<String>())
    } else {
        flat
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &TreeStatistics) {
    println!("=== Quote Tree Statistics ===\n");

    println!("Overview:");
    println!("  Total posts: {}", stats.total_posts);
    println!("  Tree depth: {}", stats.tree_depth);
    println!("  Roots: {}", stats.roots);
    println!("  Dangling parent pointers: {}", stats.dangling_parents);
    println!("  Posts with media: {}", stats.posts_with_media);
    println!();

    println!("Posts by Crawl State:");
    for state in CrawlState::all_states() {
        let count = stats.count_in_state(state);
        let percentage = if stats.total_posts > 0 {
            (count as f64 / stats.total_posts as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.permanently_failed.is_empty() {
        println!(
            "Permanently Failed ({}):",
            stats.permanently_failed.len()
        );
        for post in &stats.permanently_failed {
            println!(
                "  - {} ({} attempts): {}",
                post.uri,
                post.crawl_attempts,
                post.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    if !stats.top_quoted.is_empty() {
        println!("Top {} Most Quoted Posts:", TOP_QUOTED_LIMIT);
        for post in &stats.top_quoted {
            println!(
                "  {}: {} quotes, {} likes - {}",
                post.author_handle,
                post.quote_count,
                post.like_count,
                preview(&post.text)
            );
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!(
            "Latest run: #{} {} started {} ({})",
            run.id,
            run.kind.to_db_string(),
            run.started_at,
            run.status.to_db_string()
        );
    }
}
