//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the PostStore trait.

use crate::api::{MediaKind, MediaLink};
use crate::state::CrawlState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PostStore, StorageError, StorageResult};
use crate::storage::{
    now_timestamp, FrontierEntry, NewPost, PageOutcome, PostRecord, RunKind, RunRecord, RunStatus,
    StalePolicy,
};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;

/// Column list matching `post_from_row`
const POST_COLUMNS: &str = "id, uri, cid, author_did, author_handle, author_display_name, text,
     created_at, indexed_at, like_count, quote_count, repost_count, reply_count, parent_uri,
     embed_type, media_kind, media_url, media_title, media_description, crawl_state,
     crawl_attempts, last_error, discovered_at, discovered_run, last_crawled_at,
     last_seen_quote_count";

/// Recursion guard for tree walks; far deeper than any real quote chain
const MAX_WALK_DEPTH: i64 = 100_000;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets read-only consumers (exporters, `stats`) read between commits
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Opens an existing database without write access
    ///
    /// Nothing is created or migrated; a missing file is an error.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn crawl_state_of(&self, uri: &str) -> StorageResult<CrawlState> {
        self.conn
            .query_row(
                "SELECT crawl_state FROM posts WHERE uri = ?1",
                params![uri],
                |row| crawl_state_column(row, 0),
            )
            .optional()?
            .ok_or_else(|| StorageError::PostNotFound(uri.to_string()))
    }

    fn query_posts<P: rusqlite::Params>(&self, sql: &str, params: P) -> StorageResult<Vec<PostRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let posts = stmt
            .query_map(params, post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Inserts a post or refreshes an existing one on any connection or transaction
///
/// Returns true if the row was inserted.
fn upsert_on(
    conn: &Connection,
    post: &NewPost,
    parent_uri: Option<&str>,
    run_id: Option<i64>,
) -> rusqlite::Result<bool> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM posts WHERE uri = ?1",
            params![post.uri],
            |row| row.get(0),
        )
        .optional()?;

    if existing.is_some() {
        conn.execute(
            "UPDATE posts SET
                cid = COALESCE(?2, cid),
                author_did = COALESCE(?3, author_did),
                author_display_name = COALESCE(?4, author_display_name),
                indexed_at = COALESCE(?5, indexed_at),
                like_count = ?6,
                quote_count = ?7,
                repost_count = ?8,
                reply_count = ?9,
                parent_uri = COALESCE(parent_uri, ?10)
             WHERE uri = ?1",
            params![
                post.uri,
                post.cid,
                post.author_did,
                post.author_display_name,
                post.indexed_at,
                post.like_count as i64,
                post.quote_count as i64,
                post.repost_count as i64,
                post.reply_count as i64,
                parent_uri,
            ],
        )?;
        return Ok(false);
    }

    let media = post.media.as_ref();
    conn.execute(
        "INSERT INTO posts (
            uri, cid, author_did, author_handle, author_display_name, text,
            created_at, indexed_at, like_count, quote_count, repost_count, reply_count,
            parent_uri, embed_type, media_kind, media_url, media_title, media_description,
            crawl_state, discovered_at, discovered_run
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                   ?18, ?19, ?20, ?21)",
        params![
            post.uri,
            post.cid,
            post.author_did,
            post.author_handle,
            post.author_display_name,
            post.text,
            post.created_at,
            post.indexed_at,
            post.like_count as i64,
            post.quote_count as i64,
            post.repost_count as i64,
            post.reply_count as i64,
            parent_uri,
            post.embed_type,
            media.map(|m| m.kind.to_db_string()),
            media.map(|m| m.url.as_str()),
            media.and_then(|m| m.title.as_deref()),
            media.and_then(|m| m.description.as_deref()),
            CrawlState::Uncrawled.to_db_string(),
            now_timestamp(),
            run_id,
        ],
    )?;
    Ok(true)
}

/// Reads a crawl state column; an unknown value is a conversion error
fn crawl_state_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<CrawlState> {
    let raw: String = row.get(idx)?;
    CrawlState::from_db_string(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown crawl state '{}'", raw).into(),
        )
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    let media_kind: Option<String> = row.get(15)?;
    let media_url: Option<String> = row.get(16)?;
    let media = match (media_kind.as_deref().and_then(MediaKind::from_db_string), media_url) {
        (Some(kind), Some(url)) => Some(MediaLink {
            kind,
            url,
            title: row.get(17)?,
            description: row.get(18)?,
        }),
        _ => None,
    };

    Ok(PostRecord {
        id: row.get(0)?,
        uri: row.get(1)?,
        cid: row.get(2)?,
        author_did: row.get(3)?,
        author_handle: row.get(4)?,
        author_display_name: row.get(5)?,
        text: row.get(6)?,
        created_at: row.get(7)?,
        indexed_at: row.get(8)?,
        like_count: row.get::<_, i64>(9)? as u64,
        quote_count: row.get::<_, i64>(10)? as u64,
        repost_count: row.get::<_, i64>(11)? as u64,
        reply_count: row.get::<_, i64>(12)? as u64,
        parent_uri: row.get(13)?,
        embed_type: row.get(14)?,
        media,
        crawl_state: crawl_state_column(row, 19)?,
        crawl_attempts: row.get(20)?,
        last_error: row.get(21)?,
        discovered_at: row.get(22)?,
        discovered_run: row.get(23)?,
        last_crawled_at: row.get(24)?,
        last_seen_quote_count: row.get::<_, Option<i64>>(25)?.map(|c| c as u64),
    })
}

fn frontier_entry_from_row(row: &Row<'_>) -> rusqlite::Result<FrontierEntry> {
    Ok(FrontierEntry {
        uri: row.get(0)?,
        depth: row.get(1)?,
        crawl_state: crawl_state_column(row, 2)?,
        crawl_attempts: row.get(3)?,
        quote_count: row.get::<_, i64>(4)? as u64,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        kind: RunKind::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunKind::Crawl),
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl PostStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, kind: RunKind, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (kind, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                kind.to_db_string(),
                now_timestamp(),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, kind, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now_timestamp(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Post Management =====

    fn upsert_post(&mut self, post: &NewPost, run_id: Option<i64>) -> StorageResult<bool> {
        Ok(upsert_on(
            &self.conn,
            post,
            post.parent_uri.as_deref(),
            run_id,
        )?)
    }

    fn record_quote_page(
        &mut self,
        parent_uri: &str,
        children: &[NewPost],
        run_id: Option<i64>,
    ) -> StorageResult<PageOutcome> {
        let tx = self.conn.transaction()?;

        let parent_exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM posts WHERE uri = ?1",
                params![parent_uri],
                |row| row.get(0),
            )
            .optional()?;
        if parent_exists.is_none() {
            return Err(StorageError::Integrity(format!(
                "quote page for {} but the parent is not stored",
                parent_uri
            )));
        }

        let mut outcome = PageOutcome::default();
        for child in children {
            if child.uri == parent_uri {
                return Err(StorageError::Integrity(format!(
                    "{} listed as a quote of itself",
                    parent_uri
                )));
            }
            if upsert_on(&tx, child, Some(parent_uri), run_id)? {
                outcome.inserted += 1;
            } else {
                outcome.refreshed += 1;
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn mark_crawled(&mut self, uri: &str, quote_count_seen: u64) -> StorageResult<()> {
        let current = self.crawl_state_of(uri)?;
        if !current.can_transition_to(CrawlState::Crawled) {
            return Err(StorageError::InvalidTransition {
                uri: uri.to_string(),
                from: current,
                to: CrawlState::Crawled,
            });
        }

        self.conn.execute(
            "UPDATE posts SET crawl_state = ?1, last_crawled_at = ?2,
             last_seen_quote_count = ?3, last_error = NULL WHERE uri = ?4",
            params![
                CrawlState::Crawled.to_db_string(),
                now_timestamp(),
                quote_count_seen as i64,
                uri
            ],
        )?;
        Ok(())
    }

    fn mark_failed(&mut self, uri: &str, error: &str) -> StorageResult<()> {
        let current = self.crawl_state_of(uri)?;
        if !current.can_transition_to(CrawlState::CrawlFailed) {
            return Err(StorageError::InvalidTransition {
                uri: uri.to_string(),
                from: current,
                to: CrawlState::CrawlFailed,
            });
        }

        self.conn.execute(
            "UPDATE posts SET crawl_state = ?1, crawl_attempts = crawl_attempts + 1,
             last_error = ?2 WHERE uri = ?3",
            params![CrawlState::CrawlFailed.to_db_string(), error, uri],
        )?;
        Ok(())
    }

    fn get_post(&self, uri: &str) -> StorageResult<Option<PostRecord>> {
        let sql = format!("SELECT {} FROM posts WHERE uri = ?1", POST_COLUMNS);
        let post = self
            .conn
            .query_row(&sql, params![uri], post_from_row)
            .optional()?;
        Ok(post)
    }

    fn get_children(&self, uri: &str) -> StorageResult<Vec<PostRecord>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE parent_uri = ?1 ORDER BY id",
            POST_COLUMNS
        );
        self.query_posts(&sql, params![uri])
    }

    fn count_children(&self, uri: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE parent_uri = ?1",
            params![uri],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_uncrawled(&self) -> StorageResult<Vec<PostRecord>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE crawl_state IN (?1, ?2) ORDER BY id",
            POST_COLUMNS
        );
        self.query_posts(
            &sql,
            params![
                CrawlState::Uncrawled.to_db_string(),
                CrawlState::CrawlFailed.to_db_string()
            ],
        )
    }

    fn get_stale(&self, policy: &StalePolicy) -> StorageResult<Vec<PostRecord>> {
        let sql = format!(
            "SELECT {} FROM posts
             WHERE crawl_state = ?1 AND (last_crawled_at IS NULL OR last_crawled_at <= ?2)
             ORDER BY quote_count DESC, id",
            POST_COLUMNS
        );
        self.query_posts(
            &sql,
            params![CrawlState::Crawled.to_db_string(), policy.cutoff(Utc::now())],
        )
    }

    // ===== Frontier Derivation =====

    fn frontier_candidates(&self, max_failed_attempts: u32) -> StorageResult<Vec<FrontierEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT uri, NULL, crawl_state, crawl_attempts, quote_count FROM posts
             WHERE crawl_state = ?1 OR (crawl_state = ?2 AND crawl_attempts < ?3)
             ORDER BY id",
        )?;

        let entries = stmt
            .query_map(
                params![
                    CrawlState::Uncrawled.to_db_string(),
                    CrawlState::CrawlFailed.to_db_string(),
                    max_failed_attempts
                ],
                frontier_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn subtree_frontier_candidates(
        &self,
        root_uri: &str,
        max_depth: Option<u32>,
        max_failed_attempts: u32,
    ) -> StorageResult<Vec<FrontierEntry>> {
        let depth_bound = max_depth.map(i64::from).unwrap_or(MAX_WALK_DEPTH);

        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(uri, depth) AS (
                SELECT ?1, 0
                UNION ALL
                SELECT p.uri, s.depth + 1 FROM posts p
                JOIN subtree s ON p.parent_uri = s.uri
                WHERE s.depth < ?2
             )
             SELECT p.uri, s.depth, p.crawl_state, p.crawl_attempts, p.quote_count
             FROM subtree s JOIN posts p ON p.uri = s.uri
             WHERE p.crawl_state = ?3 OR (p.crawl_state = ?4 AND p.crawl_attempts < ?5)
             ORDER BY s.depth, p.id",
        )?;

        let entries = stmt
            .query_map(
                params![
                    root_uri,
                    depth_bound,
                    CrawlState::Uncrawled.to_db_string(),
                    CrawlState::CrawlFailed.to_db_string(),
                    max_failed_attempts
                ],
                frontier_entry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn permanently_failed(&self, max_failed_attempts: u32) -> StorageResult<Vec<PostRecord>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE crawl_state = ?1 AND crawl_attempts >= ?2 ORDER BY id",
            POST_COLUMNS
        );
        self.query_posts(
            &sql,
            params![CrawlState::CrawlFailed.to_db_string(), max_failed_attempts],
        )
    }

    // ===== Statistics =====

    fn count_total_posts(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM posts")
    }

    fn count_posts_by_state(&self, state: CrawlState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE crawl_state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_roots(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM posts WHERE parent_uri IS NULL")
    }

    fn count_dangling_parents(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM posts
             WHERE parent_uri IS NOT NULL AND parent_uri NOT IN (SELECT uri FROM posts)",
        )
    }

    fn dangling_parent_uris(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT parent_uri FROM posts
             WHERE parent_uri IS NOT NULL AND parent_uri NOT IN (SELECT uri FROM posts)
             ORDER BY parent_uri",
        )?;
        let uris = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(uris)
    }

    fn count_posts_with_media(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM posts WHERE media_url IS NOT NULL")
    }

    fn tree_depth(&self) -> StorageResult<u32> {
        let depth: i64 = self.conn.query_row(
            "WITH RECURSIVE tree(uri, depth) AS (
                SELECT uri, 0 FROM posts
                WHERE parent_uri IS NULL OR parent_uri NOT IN (SELECT uri FROM posts)
                UNION ALL
                SELECT p.uri, t.depth + 1 FROM posts p
                JOIN tree t ON p.parent_uri = t.uri
                WHERE t.depth < ?1
             )
             SELECT COALESCE(MAX(depth), 0) FROM tree",
            params![MAX_WALK_DEPTH],
            |row| row.get(0),
        )?;
        Ok(depth as u32)
    }

    fn top_quoted(&self, limit: usize) -> StorageResult<Vec<PostRecord>> {
        let sql = format!(
            "SELECT {} FROM posts ORDER BY quote_count DESC, id LIMIT ?1",
            POST_COLUMNS
        );
        self.query_posts(&sql, params![limit as i64])
    }

    fn get_edges(&self) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.parent_uri, c.uri FROM posts c
             JOIN posts p ON p.uri = c.parent_uri
             ORDER BY c.parent_uri, c.uri",
        )?;

        let edges = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(edges)
    }
}
