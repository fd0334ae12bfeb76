/// Crawl state definitions for tracking per-post traversal progress
///
/// This module defines every state a post can be in with respect to the
/// enumeration of its own quoting children.
use std::fmt;

/// Represents how far the traversal has progressed for one post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Post was discovered as a child reference but its own quotes were never listed
    Uncrawled,

    /// Every quoting child of the post has been enumerated at least once
    Crawled,

    /// Listing the post's quotes failed remotely; eligible for retry
    CrawlFailed,
}

impl CrawlState {
    /// Returns true if the post still belongs on the frontier
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Uncrawled | Self::CrawlFailed)
    }

    /// Returns true if the post's children have been fully enumerated
    pub fn is_crawled(&self) -> bool {
        matches!(self, Self::Crawled)
    }

    /// Checks the allowed-transition table
    ///
    /// | from         | to           |
    /// |--------------|--------------|
    /// | Uncrawled    | Crawled, CrawlFailed |
    /// | CrawlFailed  | Crawled, CrawlFailed |
    /// | Crawled      | Crawled      |
    ///
    /// A crawled post never regresses; re-crawling it only confirms it.
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        match (self, next) {
            (Self::Uncrawled, Self::Crawled | Self::CrawlFailed) => true,
            (Self::CrawlFailed, Self::Crawled | Self::CrawlFailed) => true,
            (Self::Crawled, Self::Crawled) => true,
            _ => false,
        }
    }

    /// Converts the crawl state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Uncrawled => "uncrawled",
            Self::Crawled => "crawled",
            Self::CrawlFailed => "crawl_failed",
        }
    }

    /// Parses a crawl state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "uncrawled" => Some(Self::Uncrawled),
            "crawled" => Some(Self::Crawled),
            "crawl_failed" => Some(Self::CrawlFailed),
            _ => None,
        }
    }

    /// Returns all possible crawl states
    pub fn all_states() -> Vec<Self> {
        vec![Self::Uncrawled, Self::Crawled, Self::CrawlFailed]
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
