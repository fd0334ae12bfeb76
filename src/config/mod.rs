//! Configuration module for quote-tree
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and reading authentication material from the environment.
//!
//! # Example
//!
//! ```no_run
//! use quote_tree::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("quote-tree.toml")).unwrap();
//! println!("Quotes per page: {}", config.api.page_size);
//! ```

mod credentials;
mod parser;
mod types;
mod validation;

// Re-export types
pub use credentials::{Credentials, APP_PASSWORD_VAR, HANDLE_VAR};
pub use types::{ApiConfig, Config, CrawlerConfig, OutputConfig, UpdateConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
