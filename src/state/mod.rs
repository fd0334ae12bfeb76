//! State module for tracking crawl progress
//!
//! `CrawlState` is the closed set of states a post moves through while its
//! quoting children are enumerated, together with the allowed transitions.

mod crawl_state;

pub use crawl_state::CrawlState;
