use crate::{create_test_config, logged_in_client, post_uri, post_view};
use quote_tree::crawler::{Coordinator, TraceOutcome, TraversalPhase};
use quote_tree::state::CrawlState;
use quote_tree::storage::{open_storage, PostStore, RunKind, RunStatus};
use quote_tree::QuoteTreeError;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_post(server: &MockServer, name: &str, quoted: Option<&str>, quote_count: u64) {
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getPosts"))
        .and(query_param("uris", post_uri(name).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "posts": [post_view(name, quoted, quote_count)] })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_against_mock_service() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    mount_post(&mock_server, "r", None, 3).await;

    // R is quoted by A, B and C over two pages; A is quoted by D
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .and(query_param("cursor", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("c", Some("r"), 0)],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("a", Some("r"), 1), post_view("b", Some("r"), 0)],
            "cursor": "page-2",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("a").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("d", Some("a"), 0)],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    // Posts with a zero quote count are never listed
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("b").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "posts": [] })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let report = coordinator.crawl(&post_uri("r")).await.unwrap();

    assert_eq!(report.phase, TraversalPhase::Drained);
    assert_eq!(report.posts_discovered, 4);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.nodes_failed, 0);

    let storage = coordinator.into_storage();
    assert_eq!(storage.count_total_posts().unwrap(), 5);
    assert_eq!(
        storage.get_edges().unwrap(),
        vec![
            (post_uri("a"), post_uri("d")),
            (post_uri("r"), post_uri("a")),
            (post_uri("r"), post_uri("b")),
            (post_uri("r"), post_uri("c")),
        ]
    );
    for name in ["r", "a", "b", "c", "d"] {
        let post = storage.get_post(&post_uri(name)).unwrap().unwrap();
        assert_eq!(post.crawl_state, CrawlState::Crawled, "{}", name);
    }

    let root = storage.get_post(&post_uri("r")).unwrap().unwrap();
    assert_eq!(root.author_handle, "r.test");
    assert_eq!(root.author_display_name.as_deref(), Some("R"));
    assert_eq!(root.last_seen_quote_count, Some(3));

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.kind, RunKind::Crawl);
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_crawl_resumes_from_existing_database() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    mount_post(&mock_server, "r", None, 1).await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("a", Some("r"), 0)],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    {
        let storage = open_storage(&db_path).unwrap();
        let mut coordinator =
            Coordinator::new(client, storage, config.clone(), "test-hash".to_string());
        coordinator.crawl(&post_uri("r")).await.unwrap();
    }

    // A second process sees a finished tree and issues no quote requests
    let client = quote_tree::api::BskyClient::new(&config.api, &config.user_agent).unwrap();
    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let report = coordinator.crawl_all().await.unwrap();

    assert_eq!(report.nodes_crawled, 0);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(coordinator.storage().count_total_posts().unwrap(), 2);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    mount_post(&mock_server, "r", None, 1).await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("a", Some("r"), 0)],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let report = coordinator.crawl(&post_uri("r")).await.unwrap();

    assert_eq!(report.nodes_failed, 0);
    assert_eq!(report.posts_discovered, 1);
    let root = coordinator.storage().get_post(&post_uri("r")).unwrap().unwrap();
    assert_eq!(root.crawl_state, CrawlState::Crawled);
}

#[tokio::test]
async fn test_persistent_failure_is_isolated() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    mount_post(&mock_server, "r", None, 2).await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("r").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("a", Some("r"), 5), post_view("b", Some("r"), 1)],
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("a").as_str()))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "InternalServerError",
            "message": "Internal Server Error",
        })))
        .expect(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .and(query_param("uri", post_uri("b").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [post_view("c", Some("b"), 0)],
        })))
        .mount(&mock_server)
        .await;

    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let report = coordinator.crawl(&post_uri("r")).await.unwrap();

    assert_eq!(report.phase, TraversalPhase::Drained);
    assert_eq!(report.nodes_failed, 1);

    let storage = coordinator.storage();
    let failed = storage.get_post(&post_uri("a")).unwrap().unwrap();
    assert_eq!(failed.crawl_state, CrawlState::CrawlFailed);
    assert_eq!(failed.crawl_attempts, 1);
    assert!(failed.last_error.is_some());
    for name in ["r", "b", "c"] {
        let post = storage.get_post(&post_uri(name)).unwrap().unwrap();
        assert_eq!(post.crawl_state, CrawlState::Crawled, "{}", name);
    }
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_expired_session_aborts_crawl() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    mount_post(&mock_server, "r", None, 1).await;
    Mock::given(method("GET"))
        .and(path("/xrpc/app.bsky.feed.getQuotes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "ExpiredToken",
            "message": "Token has expired",
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let err = coordinator.crawl(&post_uri("r")).await.unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, QuoteTreeError::Api(ref e) if e.is_auth()));

    let storage = coordinator.storage();
    let root = storage.get_post(&post_uri("r")).unwrap().unwrap();
    assert_eq!(root.crawl_state, CrawlState::Uncrawled);
    assert_eq!(root.crawl_attempts, 0);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_trace_from_web_url() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("tree.db");
    let config = create_test_config(&mock_server, db_path.to_str().unwrap());
    let client = logged_in_client(&mock_server, &config).await;

    Mock::given(method("GET"))
        .and(path("/xrpc/com.atproto.identity.resolveHandle"))
        .and(query_param("handle", "c.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "did": "did:plc:c" })))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_post(&mock_server, "c", Some("a"), 0).await;
    mount_post(&mock_server, "a", Some("r"), 1).await;
    mount_post(&mock_server, "r", None, 1).await;

    let storage = open_storage(&db_path).unwrap();
    let mut coordinator = Coordinator::new(client, storage, config, "test-hash".to_string());
    let report = coordinator
        .trace("https://bsky.app/profile/c.test/post/c")
        .await
        .unwrap();

    assert_eq!(report.outcome, TraceOutcome::ReachedRoot);
    assert_eq!(
        report.chain,
        vec![post_uri("c"), post_uri("a"), post_uri("r")]
    );
    assert_eq!(report.root(), Some(post_uri("r").as_str()));
    assert_eq!(report.fetched, 3);

    let storage = coordinator.storage();
    assert_eq!(storage.count_roots().unwrap(), 1);
    assert_eq!(storage.count_dangling_parents().unwrap(), 0);
    assert_eq!(
        storage.get_post(&post_uri("c")).unwrap().unwrap().parent_uri,
        Some(post_uri("a"))
    );
}
