//! In-process fake of the remote service for engine tests

use crate::api::{ApiError, ApiResult, QuoteApi, QuotePage, RemotePost};
use crate::crawler::Interrupt;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// DID-based post URI for a short test name
pub(crate) fn uri(name: &str) -> String {
    format!("at://did:plc:{}/app.bsky.feed.post/{}", name, name)
}

pub(crate) fn remote_post(uri: &str, quoted_uri: Option<&str>, quote_count: u64) -> RemotePost {
    RemotePost {
        uri: uri.to_string(),
        cid: Some(format!("cid-{}", uri)),
        author_did: "did:plc:author".to_string(),
        author_handle: "author.test".to_string(),
        author_display_name: None,
        text: format!("quoting {:?}", quoted_uri),
        created_at: Some("2024-11-01T00:00:00.000Z".to_string()),
        indexed_at: None,
        like_count: 0,
        quote_count: Some(quote_count),
        repost_count: 0,
        reply_count: 0,
        quoted_uri: quoted_uri.map(str::to_string),
        embed_type: quoted_uri.map(|_| "app.bsky.embed.record".to_string()),
        media: None,
    }
}

#[derive(Default)]
struct Remote {
    posts: HashMap<String, RemotePost>,
    quotes: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    auth_broken: bool,
    quote_calls: Vec<(String, Option<String>)>,
    interrupt_after: Option<(usize, Interrupt)>,
}

/// Scripted quote graph served page by page
pub(crate) struct FakeApi {
    page_size: usize,
    remote: Mutex<Remote>,
}

impl FakeApi {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            page_size,
            remote: Mutex::new(Remote::default()),
        }
    }

    /// Adds a post quoting `parent`, keeping every quote count consistent
    pub(crate) fn add_post(&self, uri: &str, parent: Option<&str>) {
        let mut remote = self.remote.lock().unwrap();
        let count = remote.quotes.get(uri).map_or(0, Vec::len) as u64;
        remote
            .posts
            .insert(uri.to_string(), remote_post(uri, parent, count));
        if let Some(parent) = parent {
            remote
                .quotes
                .entry(parent.to_string())
                .or_default()
                .push(uri.to_string());
            let siblings = remote.quotes[parent].len() as u64;
            if let Some(p) = remote.posts.get_mut(parent) {
                p.quote_count = Some(siblings);
            }
        }
    }

    pub(crate) fn remove_post(&self, uri: &str) {
        self.remote.lock().unwrap().posts.remove(uri);
    }

    /// Overrides the quote count reported for a post
    pub(crate) fn set_quote_count(&self, uri: &str, count: Option<u64>) {
        if let Some(p) = self.remote.lock().unwrap().posts.get_mut(uri) {
            p.quote_count = count;
        }
    }

    pub(crate) fn fail_quotes(&self, uri: &str) {
        self.remote.lock().unwrap().failing.insert(uri.to_string());
    }

    pub(crate) fn heal(&self, uri: &str) {
        self.remote.lock().unwrap().failing.remove(uri);
    }

    pub(crate) fn break_auth(&self) {
        self.remote.lock().unwrap().auth_broken = true;
    }

    /// Triggers `interrupt` once `calls` quote pages have been served
    pub(crate) fn interrupt_after(&self, calls: usize, interrupt: Interrupt) {
        self.remote.lock().unwrap().interrupt_after = Some((calls, interrupt));
    }

    /// Every quote page request so far, as (uri, cursor)
    pub(crate) fn quote_calls(&self) -> Vec<(String, Option<String>)> {
        self.remote.lock().unwrap().quote_calls.clone()
    }

    pub(crate) fn quote_calls_for(&self, uri: &str) -> usize {
        self.quote_calls().iter().filter(|(u, _)| u == uri).count()
    }
}

#[async_trait]
impl QuoteApi for FakeApi {
    async fn fetch_quotes_page(&self, uri: &str, cursor: Option<&str>) -> ApiResult<QuotePage> {
        let mut remote = self.remote.lock().unwrap();
        remote
            .quote_calls
            .push((uri.to_string(), cursor.map(str::to_string)));

        if let Some((after, interrupt)) = &remote.interrupt_after {
            if remote.quote_calls.len() >= *after {
                interrupt.trigger();
            }
        }
        if remote.auth_broken {
            return Err(ApiError::Auth("session expired".to_string()));
        }
        if remote.failing.contains(uri) {
            return Err(ApiError::RetriesExhausted {
                attempts: 5,
                last: "503 Service Unavailable".to_string(),
            });
        }

        let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let children = remote.quotes.get(uri).cloned().unwrap_or_default();
        let end = (offset + self.page_size).min(children.len());
        let posts = children[offset.min(end)..end]
            .iter()
            .filter_map(|c| remote.posts.get(c).cloned())
            .collect();

        Ok(QuotePage {
            posts,
            cursor: (end < children.len()).then(|| end.to_string()),
        })
    }

    async fn fetch_post(&self, uri: &str) -> ApiResult<RemotePost> {
        let remote = self.remote.lock().unwrap();
        if remote.auth_broken {
            return Err(ApiError::Auth("session expired".to_string()));
        }
        remote
            .posts
            .get(uri)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(uri.to_string()))
    }

    async fn resolve_handle(&self, handle: &str) -> ApiResult<String> {
        match handle.strip_suffix(".test") {
            Some(name) => Ok(format!("did:plc:{}", name)),
            None => Err(ApiError::InvalidIdentifier(handle.to_string())),
        }
    }
}
