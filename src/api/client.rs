//! HTTP client for the XRPC API
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Session login and bearer authentication
//! - Client-side request spacing
//! - Retry with exponential backoff for transient failures
//! - Error classification

use crate::api::error::{ApiError, ApiResult};
use crate::api::retry::ExponentialBackoff;
use crate::api::throttle::Throttle;
use crate::api::types::{
    CreateSessionRequest, CreateSessionResponse, GetPostsResponse, GetQuotesResponse,
    ResolveHandleResponse, XrpcErrorBody,
};
use crate::api::{QuoteApi, QuotePage, RemotePost};
use crate::config::{ApiConfig, Credentials, UserAgentConfig};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// XRPC error names that mean the session itself is unusable
const AUTH_ERROR_NAMES: &[&str] = &[
    "AuthMissing",
    "AuthenticationRequired",
    "ExpiredToken",
    "InvalidToken",
    "AccountTakedown",
];

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `api` - Timeouts for the client
/// * `user_agent` - The user agent configuration
pub fn build_http_client(
    api: &ApiConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(api.request_timeout_secs))
        .connect_timeout(Duration::from_secs(api.request_timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated client for the quote and post endpoints
pub struct BskyClient {
    http: Client,
    service_url: String,
    page_size: u32,
    max_attempts: u32,
    backoff: ExponentialBackoff,
    throttle: Mutex<Throttle>,
    access_jwt: Option<String>,
}

impl BskyClient {
    /// Creates an unauthenticated client
    pub fn new(api: &ApiConfig, user_agent: &UserAgentConfig) -> ApiResult<Self> {
        let http = build_http_client(api, user_agent)
            .map_err(|e| ApiError::Rejected {
                status: 0,
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            service_url: api.service_url.trim_end_matches('/').to_string(),
            page_size: api.page_size,
            max_attempts: api.max_attempts.max(1),
            backoff: ExponentialBackoff::new(api.initial_backoff_ms, api.max_backoff_ms),
            throttle: Mutex::new(Throttle::new(Duration::from_millis(
                api.min_request_interval_ms,
            ))),
            access_jwt: None,
        })
    }

    /// Creates a client and opens a session with the given credentials
    ///
    /// The session is established once and reused for the client's lifetime.
    pub async fn login(
        api: &ApiConfig,
        user_agent: &UserAgentConfig,
        credentials: &Credentials,
    ) -> ApiResult<Self> {
        let mut client = Self::new(api, user_agent)?;
        client.authenticate(credentials).await?;
        Ok(client)
    }

    /// Opens a session and stores its access token
    pub async fn authenticate(&mut self, credentials: &Credentials) -> ApiResult<()> {
        let url = self.endpoint("com.atproto.server.createSession");
        let body = CreateSessionRequest {
            identifier: &credentials.handle,
            password: &credentials.app_password,
        };

        let session: CreateSessionResponse = self
            .execute("createSession", || self.http.post(&url).json(&body))
            .await
            .map_err(|e| match e {
                // The login endpoint answers bad credentials with a 401 or a 400
                ApiError::Auth(_) | ApiError::Rejected { .. } | ApiError::InvalidIdentifier(_) => {
                    ApiError::Auth(format!("login as {} failed: {}", credentials.handle, e))
                }
                other => other,
            })?;

        info!("Authenticated as {} ({})", session.handle, session.did);
        self.access_jwt = Some(session.access_jwt);
        Ok(())
    }

    /// Total requests issued, including retries
    pub async fn request_count(&self) -> u64 {
        self.throttle.lock().await.request_count()
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.service_url, method)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_jwt {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn wait_for_turn(&self) {
        let mut throttle = self.throttle.lock().await;
        if let Some(wait) = throttle.time_until_next_request(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
        throttle.record_request(Instant::now());
    }

    /// Sends a request, retrying transient failures with backoff
    ///
    /// `build` is called once per attempt.
    async fn execute<T, F>(&self, label: &str, build: F) -> ApiResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            self.wait_for_turn().await;

            let err = match self.send_once(&build).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            attempt += 1;
            if attempt >= self.max_attempts {
                return Err(ApiError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let delay = self
                .backoff
                .delay_with_hint(attempt - 1, err.retry_after());
            warn!(
                "{} failed (attempt {}/{}): {}; retrying in {:?}",
                label, attempt, self.max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once<T, F>(&self, build: &F) -> ApiResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = build().send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()));
        }

        Err(classify_status(status, &body, retry_after))
    }
}

/// Maps a non-success HTTP status and XRPC error body to an ApiError
pub(crate) fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ApiError {
    let xrpc: XrpcErrorBody = serde_json::from_str(body).unwrap_or_default();
    let name = xrpc.error.unwrap_or_default();
    let message = match xrpc.message {
        Some(m) if !name.is_empty() => format!("{}: {}", name, m),
        Some(m) => m,
        None if !name.is_empty() => name.clone(),
        None => status.to_string(),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return ApiError::Transient {
            message: format!("{} ({})", message, status),
            retry_after,
        };
    }

    if status == StatusCode::UNAUTHORIZED || AUTH_ERROR_NAMES.contains(&name.as_str()) {
        return ApiError::Auth(message);
    }

    match (status, name.as_str()) {
        (StatusCode::NOT_FOUND, _) | (_, "NotFound") => ApiError::NotFound(message),
        (StatusCode::BAD_REQUEST, "InvalidRequest") => ApiError::InvalidIdentifier(message),
        _ => ApiError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl QuoteApi for BskyClient {
    async fn fetch_quotes_page(&self, uri: &str, cursor: Option<&str>) -> ApiResult<QuotePage> {
        let url = self.endpoint("app.bsky.feed.getQuotes");
        let limit = self.page_size.to_string();

        let response: GetQuotesResponse = self
            .execute("getQuotes", || {
                let mut query = vec![("uri", uri), ("limit", limit.as_str())];
                if let Some(cursor) = cursor {
                    query.push(("cursor", cursor));
                }
                self.authorized(self.http.get(&url).query(&query))
            })
            .await?;

        debug!(
            "getQuotes {} returned {} posts (more: {})",
            uri,
            response.posts.len(),
            response.cursor.is_some()
        );

        Ok(QuotePage {
            posts: response.posts.into_iter().map(RemotePost::from).collect(),
            cursor: response.cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn fetch_post(&self, uri: &str) -> ApiResult<RemotePost> {
        let url = self.endpoint("app.bsky.feed.getPosts");

        let response: GetPostsResponse = self
            .execute("getPosts", || {
                self.authorized(self.http.get(&url).query(&[("uris", uri)]))
            })
            .await?;

        // One URI was requested, so any returned post is that post
        response
            .posts
            .into_iter()
            .next()
            .map(RemotePost::from)
            .ok_or_else(|| ApiError::NotFound(uri.to_string()))
    }

    async fn resolve_handle(&self, handle: &str) -> ApiResult<String> {
        let url = self.endpoint("com.atproto.identity.resolveHandle");

        let response: ResolveHandleResponse = self
            .execute("resolveHandle", || {
                self.authorized(self.http.get(&url).query(&[("handle", handle)]))
            })
            .await
            .map_err(|e| match e {
                ApiError::Rejected { .. } | ApiError::InvalidIdentifier(_) => {
                    ApiError::InvalidIdentifier(format!("cannot resolve handle {}: {}", handle, e))
                }
                other => other,
            })?;

        Ok(response.did)
    }
}
