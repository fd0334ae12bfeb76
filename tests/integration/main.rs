//! Integration tests against a mock XRPC service
//!
//! These tests use wiremock to stand in for the remote API and run the
//! client and the crawler end-to-end against a temporary database.

mod api_tests;
mod crawl_tests;

use quote_tree::api::BskyClient;
use quote_tree::config::{Config, Credentials};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCESS_JWT: &str = "test-access-jwt";

/// Creates a test configuration pointing at the mock server
pub fn create_test_config(server: &MockServer, db_path: &str) -> Config {
    let mut config = Config::default();
    config.api.service_url = format!("{}/xrpc", server.uri());
    config.api.page_size = 2;
    config.api.min_request_interval_ms = 0;
    config.api.max_attempts = 3;
    config.api.initial_backoff_ms = 1;
    config.api.max_backoff_ms = 5;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.database_path = db_path.to_string();
    config
}

pub fn test_credentials() -> Credentials {
    Credentials {
        handle: "tester.test".to_string(),
        app_password: "app-pass".to_string(),
    }
}

pub fn post_uri(name: &str) -> String {
    format!("at://did:plc:{}/app.bsky.feed.post/{}", name, name)
}

/// A hydrated post view as the feed endpoints return it
pub fn post_view(name: &str, quoted: Option<&str>, quote_count: u64) -> Value {
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": format!("post {}", name),
        "createdAt": "2024-11-20T12:00:00.000Z",
    });
    if let Some(parent) = quoted {
        record["embed"] = json!({
            "$type": "app.bsky.embed.record",
            "record": { "uri": post_uri(parent), "cid": "bafyparent" },
        });
    }

    json!({
        "uri": post_uri(name),
        "cid": format!("bafy{}", name),
        "author": {
            "did": format!("did:plc:{}", name),
            "handle": format!("{}.test", name),
            "displayName": name.to_uppercase(),
        },
        "record": record,
        "indexedAt": "2024-11-20T12:00:01.000Z",
        "likeCount": 3,
        "quoteCount": quote_count,
        "repostCount": 1,
        "replyCount": 0,
    })
}

/// Mounts a successful createSession endpoint
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .and(body_json(json!({
            "identifier": "tester.test",
            "password": "app-pass",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": ACCESS_JWT,
            "refreshJwt": "test-refresh-jwt",
            "did": "did:plc:tester",
            "handle": "tester.test",
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn logged_in_client(server: &MockServer, config: &Config) -> BskyClient {
    mount_login(server).await;
    BskyClient::login(&config.api, &config.user_agent, &test_credentials())
        .await
        .expect("login against mock server")
}
