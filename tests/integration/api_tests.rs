use crate::{create_test_config, logged_in_client, post_uri, post_view, test_credentials, ACCESS_JWT};
use quote_tree::api::{ApiError, BskyClient, QuoteApi};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_login_rejected_is_auth_error() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server, "unused.db");

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "AuthenticationRequired",
            "message": "Invalid identifier or password",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = BskyClient::login(&config.api, &config.user_agent, &test_credentials()).await;
    match result {
        Err(e) => assert!(e.is_auth(), "unexpected error: {e}"),
        Ok(_) => panic!("login should fail"),
    }
}

#[tokio::test]
async fn test_quotes_page_is_authorized_and_decoded() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server, "unused.db");
    let client = logged_in_client(&mock_server, &config).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .and(query_param("limit", "2"))
        .and(query_param("cursor", "abc"))
        .and(header("authorization", format!("Bearer {}", ACCESS_JWT).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uri": post_uri("r"),
            "posts": [post_view("a", Some("r"), 4)],
            "cursor": "",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let page = client
        .fetch_quotes_page(&post_uri("r"), Some("abc"))
        .await
        .unwrap();

    assert_eq!(page.posts.len(), 1);
    assert!(page.cursor.is_none(), "empty cursor means no more pages");
    let post = &page.posts[0];
    assert_eq!(post.uri, post_uri("a"));
    assert_eq!(post.quoted_uri.as_deref(), Some(post_uri("r").as_str()));
    assert_eq!(post.quote_count, Some(4));
    assert_eq!(post.author_handle, "a.test");
    assert_eq!(post.embed_type.as_deref(), Some("app.bsky.embed.record"));
}

#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server, "unused.db");
    let client = logged_in_client(&mock_server, &config).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({
                    "error": "RateLimitExceeded",
                    "message": "Rate Limit Exceeded",
                })),
        )
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = client
        .fetch_quotes_page(&post_uri("r"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::RetriesExhausted { attempts: 3, .. }));
    // Login plus three attempts
    assert_eq!(client.request_count().await, 4);
}

#[tokio::test]
async fn test_missing_post_is_not_found() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server, "unused.db");
    let client = logged_in_client(&mock_server, &config).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getPosts"))
        .and(query_param("uris", post_uri("gone").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "posts": [] })))
        .mount(&mock_server)
        .await;

    let err = client.fetch_post(&post_uri("gone")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_unknown_handle_is_invalid_identifier() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server, "unused.db");
    let client = logged_in_client(&mock_server, &config).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.identity.resolveHandle"))
        .and(query_param("handle", "nobody.test"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "InvalidRequest",
            "message": "Unable to resolve handle",
        })))
        .mount(&mock_server)
        .await;

    let err = client.resolve_handle("nobody.test").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidIdentifier(_)));
}
