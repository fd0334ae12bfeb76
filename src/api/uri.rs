//! Post identifier parsing
//!
//! Posts can be named by a DID-based AT URI, a handle-based AT URI, or a
//! web URL of the form `https://bsky.app/profile/<actor>/post/<rkey>`.

use crate::api::{ApiError, ApiResult};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Collection NSID of feed posts
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

static AT_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^at://([^/\s]+)/app\.bsky\.feed\.post/([A-Za-z0-9._:~-]+)/?$")
        .expect("static regex")
});

static WEB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?bsky\.(?:app|social)/profile/([^/\s]+)/post/([A-Za-z0-9._:~-]+)/?(?:[?#].*)?$")
        .expect("static regex")
});

/// A parsed post identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUri {
    /// DID or handle of the author
    pub authority: String,
    /// Record key of the post
    pub rkey: String,
}

impl PostUri {
    /// Parses any of the accepted identifier forms
    pub fn parse(input: &str) -> ApiResult<Self> {
        let input = input.trim();
        let caps = AT_URI
            .captures(input)
            .or_else(|| WEB_URL.captures(input))
            .ok_or_else(|| ApiError::InvalidIdentifier(input.to_string()))?;

        Ok(Self {
            authority: caps[1].to_string(),
            rkey: caps[2].to_string(),
        })
    }

    /// Returns true if the authority is already a DID
    pub fn is_did(&self) -> bool {
        self.authority.starts_with("did:")
    }

    /// The same post with a different authority (typically its resolved DID)
    pub fn with_authority(&self, authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            rkey: self.rkey.clone(),
        }
    }

    pub fn to_at_uri(&self) -> String {
        format!("at://{}/{}/{}", self.authority, POST_COLLECTION, self.rkey)
    }
}

impl fmt::Display for PostUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_at_uri())
    }
}
