//! Quote-tree: discovers and persists the quote-post tree rooted at a single post
//!
//! This crate walks the quote graph of a Bluesky-style social network through
//! its paginated XRPC API, persisting every discovered post and its
//! parent→child "quotes" edge in an idempotent SQLite store. It supports a full
//! breadth-first crawl, a resumable whole-store crawl, a reverse trace to the
//! root, and a cheap incremental update pass.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for quote-tree operations
#[derive(Debug, Error)]
pub enum QuoteTreeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuoteTreeError {
    /// Returns true if this error must abort the whole run
    ///
    /// Authentication failures and store-corruption-class errors are fatal.
    /// Everything else (remote not-found, exhausted retries, integrity
    /// violations on a single node) is isolated to the node that raised it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Api(e) => e.is_auth(),
            Self::Storage(e) => !e.is_integrity(),
            Self::Database(_) | Self::Config(_) | Self::Io(_) => true,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Result type alias for quote-tree operations
pub type Result<T> = std::result::Result<T, QuoteTreeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::CrawlState;
