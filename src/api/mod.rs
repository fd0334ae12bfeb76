//! Remote API client
//!
//! This module wraps the social network's XRPC endpoints behind the
//! `QuoteApi` trait: paginated quote listings, fetch-by-URI and handle
//! resolution. The crawler depends only on the trait.

mod client;
mod error;
mod media;
mod retry;
mod throttle;
mod types;
mod uri;

pub use client::{build_http_client, BskyClient};
pub use error::{ApiError, ApiResult};
pub use media::{classify_url, detect_media, LinkCard, MediaKind, MediaLink};
pub use retry::ExponentialBackoff;
pub use throttle::Throttle;
pub use types::{QuotePage, RemotePost};
pub use uri::{PostUri, POST_COLLECTION};

use async_trait::async_trait;

/// Operations the crawler needs from the remote service
#[async_trait]
pub trait QuoteApi: Send + Sync {
    /// Fetches one page of the posts quoting `uri`
    ///
    /// `uri` must be DID-based. Pass the previous page's cursor to continue
    /// the listing; a page with no cursor is the last.
    async fn fetch_quotes_page(&self, uri: &str, cursor: Option<&str>) -> ApiResult<QuotePage>;

    /// Fetches a single post, or `ApiError::NotFound` if it is unavailable
    async fn fetch_post(&self, uri: &str) -> ApiResult<RemotePost>;

    /// Resolves a handle to its DID
    async fn resolve_handle(&self, handle: &str) -> ApiResult<String>;

    /// Returns the DID-based AT URI for any accepted identifier form
    async fn resolve_post_uri(&self, uri: &PostUri) -> ApiResult<String> {
        if uri.is_did() {
            return Ok(uri.to_at_uri());
        }
        let did = self.resolve_handle(&uri.authority).await?;
        Ok(uri.with_authority(did).to_at_uri())
    }
}
