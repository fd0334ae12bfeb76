//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the quote-tree database.

/// SQL schema for the database
///
/// `posts.parent_uri` deliberately carries no foreign key: an ancestor found
/// by a trace is inserted after the child that points at it.
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Every discovered post; the parent pointer encodes the quote edge
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    cid TEXT,
    author_did TEXT,
    author_handle TEXT NOT NULL,
    author_display_name TEXT,
    text TEXT NOT NULL DEFAULT '',
    created_at TEXT,
    indexed_at TEXT,
    like_count INTEGER NOT NULL DEFAULT 0,
    quote_count INTEGER NOT NULL DEFAULT 0,
    repost_count INTEGER NOT NULL DEFAULT 0,
    reply_count INTEGER NOT NULL DEFAULT 0,
    parent_uri TEXT,
    embed_type TEXT,
    media_kind TEXT,
    media_url TEXT,
    media_title TEXT,
    media_description TEXT,
    crawl_state TEXT NOT NULL DEFAULT 'uncrawled',
    crawl_attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    discovered_at TEXT NOT NULL,
    discovered_run INTEGER REFERENCES runs(id),
    last_crawled_at TEXT,
    last_seen_quote_count INTEGER
);

CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(parent_uri);
CREATE INDEX IF NOT EXISTS idx_posts_state ON posts(crawl_state);
CREATE INDEX IF NOT EXISTS idx_posts_media ON posts(media_url);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
