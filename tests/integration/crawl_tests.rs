//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock to stand in for the admin API and run the full
//! pipeline into a temporary SQLite database.

use serde_json::json;
use sharedbox_sync::config::Config;
use sharedbox_sync::crawler::{
    run_pipeline, ApiRateLimiter, Pipeline, PipelineReport, PipelineSettings,
};
use sharedbox_sync::gateway::AdminApiClient;
use sharedbox_sync::storage::{open_storage, Collection, SqliteStore};
use sharedbox_sync::Operation;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION: &str = "test-session";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.storage.database_path = dir.path().join("sync.db").display().to_string();
    config.crawler.workers = 4;
    config.crawler.requests_per_second = 200;
    config.crawler.job_timeout_ms = 1000;
    config
}

fn list_path(node: &str) -> String {
    if node.is_empty() {
        "/sharedboxes/lists".to_string()
    } else {
        format!("/sharedboxes/lists/{}", node)
    }
}

fn list_body(children: &[&str]) -> serde_json::Value {
    let lists: Vec<_> = children
        .iter()
        .map(|child| {
            json!({
                "name": format!("Box {}", child),
                "node": child,
                "url": format!("https://drive.example.com/{}", child),
                "drive_path": format!("/Shared/{}", child),
            })
        })
        .collect();
    json!({"success": true, "total": lists.len(), "lists": lists})
}

/// Mounts the children of `node`, expecting exactly `times` requests
async fn mount_list(server: &MockServer, node: &str, children: &[&str], times: u64) {
    Mock::given(method("GET"))
        .and(path(list_path(node)))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_body(children)))
        .expect(times)
        .mount(server)
        .await;
}

async fn run_crawl(
    config: &Config,
    store: &SqliteStore,
    collection: Collection,
    operation: Operation,
    root: &str,
) -> PipelineReport {
    let client = AdminApiClient::new(&config.api, "test-token".to_string()).unwrap();
    let pipeline = Pipeline {
        gateway: Arc::new(client),
        limiter: ApiRateLimiter::new(config.crawler.requests_per_second),
        item_store: Arc::new(store.item_store(collection)),
        error_log: Arc::new(store.clone()),
        settings: PipelineSettings::from_config(config, true, operation.error_list_key(SESSION)),
    };

    run_pipeline(pipeline, root.to_string(), CancellationToken::new())
        .await
        .expect("pipeline should not fail on node errors")
}

async fn run_sync(config: &Config, store: &SqliteStore, root: &str) -> PipelineReport {
    run_crawl(config, store, Collection::SharedBoxes, Operation::SharedBoxSync, root).await
}

async fn run_import(config: &Config, store: &SqliteStore, root: &str) -> PipelineReport {
    run_crawl(config, store, Collection::Items, Operation::SharedBoxImport, root).await
}

fn parent_of(store: &SqliteStore, node: &str) -> String {
    store
        .get_shared_box(node)
        .unwrap()
        .unwrap_or_else(|| panic!("{} should be stored", node))
        .parent_node
}

#[tokio::test]
async fn test_recursive_sync_records_parents() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["A", "B"], 1).await;
    mount_list(&mock_server, "A", &["C"], 1).await;
    mount_list(&mock_server, "B", &[], 1).await;
    mount_list(&mock_server, "C", &[], 1).await;

    let report = run_sync(&config, &store, "").await;

    assert_eq!(report.crawl.jobs, 4);
    assert_eq!(report.crawl.edges, 3);
    assert_eq!(report.crawl.node_errors, 0);
    assert_eq!(report.items.upserts.inserted, 3);

    assert_eq!(store.count(Collection::SharedBoxes).unwrap(), 3);
    assert_eq!(parent_of(&store, "A"), "");
    assert_eq!(parent_of(&store, "B"), "");
    assert_eq!(parent_of(&store, "C"), "A");

    let stored = store.get_shared_box("C").unwrap().unwrap();
    assert_eq!(stored.item.name, "Box C");
    assert_eq!(stored.item.drive_path, "/Shared/C");

    assert!(store
        .error_messages(&Operation::SharedBoxSync.error_list_key(SESSION))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["A", "B"], 2).await;
    mount_list(&mock_server, "A", &["C"], 2).await;
    mount_list(&mock_server, "B", &[], 2).await;
    mount_list(&mock_server, "C", &[], 2).await;

    let first = run_sync(&config, &store, "").await;
    let second = run_sync(&config, &store, "").await;

    assert_eq!(first.items.upserts.inserted, 3);
    assert_eq!(second.items.upserts.inserted, 0);
    assert_eq!(second.items.upserts.replaced, 3);
    assert_eq!(store.count(Collection::SharedBoxes).unwrap(), 3);
}

#[tokio::test]
async fn test_subtree_sync_starts_at_node() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["A"], 0).await;
    mount_list(&mock_server, "A", &["C"], 1).await;
    mount_list(&mock_server, "C", &[], 1).await;

    let report = run_sync(&config, &store, "A").await;

    assert_eq!(report.crawl.edges, 1);
    assert_eq!(parent_of(&store, "C"), "A");
    assert!(store.get_shared_box("A").unwrap().is_none());
}

#[tokio::test]
async fn test_failing_node_is_logged_and_siblings_continue() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["X", "D"], 1).await;
    mount_list(&mock_server, "D", &[], 1).await;
    Mock::given(method("GET"))
        .and(path(list_path("X")))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal failure"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = run_sync(&config, &store, "").await;

    assert_eq!(report.crawl.node_errors, 1);
    assert_eq!(report.errors.appended, 1);

    let errors = store
        .error_messages(&Operation::SharedBoxSync.error_list_key(SESSION))
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("NodeError: node=X, err="));
    assert!(errors[0].contains("500"));

    // X itself was discovered under the root before its own listing failed
    assert_eq!(store.count(Collection::SharedBoxes).unwrap(), 2);
}

#[tokio::test]
async fn test_slow_node_times_out_and_branch_is_abandoned() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&mock_server.uri(), &dir);
    config.crawler.job_timeout_ms = 300;
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["X", "D"], 1).await;
    mount_list(&mock_server, "D", &[], 1).await;
    mount_list(&mock_server, "Y", &[], 0).await;
    Mock::given(method("GET"))
        .and(path(list_path("X")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_body(&["Y"]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let report = run_sync(&config, &store, "").await;

    assert_eq!(report.crawl.node_errors, 1);
    let errors = store
        .error_messages(&Operation::SharedBoxSync.error_list_key(SESSION))
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("node=X"));
    assert!(errors[0].contains("timeout"));
    assert!(store.get_shared_box("Y").unwrap().is_none());
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_node_error() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    Mock::given(method("GET"))
        .and(path(list_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = run_sync(&config, &store, "").await;

    assert_eq!(report.crawl.node_errors, 1);
    let errors = store
        .error_messages(&Operation::SharedBoxSync.error_list_key(SESSION))
        .unwrap();
    let expected = format!(
        "NodeError: node=, err=API reported an unsuccessful response for {}/sharedboxes/lists?lang=eng",
        mock_server.uri()
    );
    assert_eq!(errors, vec![expected]);
}

#[tokio::test]
async fn test_import_writes_item_table() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    mount_list(&mock_server, "", &["A", "B"], 1).await;
    mount_list(&mock_server, "A", &[], 1).await;
    mount_list(&mock_server, "B", &[], 1).await;

    let report = run_import(&config, &store, "").await;

    assert_eq!(report.items.flushed_items, 2);
    assert_eq!(store.count(Collection::Items).unwrap(), 2);
    assert_eq!(store.count(Collection::SharedBoxes).unwrap(), 0);
    assert_eq!(store.get_item("B").unwrap().unwrap().name, "Box B");
}

#[tokio::test]
async fn test_errors_are_kept_per_operation() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    run_import(&config, &store, "").await;

    assert_eq!(
        store
            .error_messages(&Operation::SharedBoxImport.error_list_key(SESSION))
            .unwrap()
            .len(),
        1
    );
    assert!(store
        .error_messages(&Operation::SharedBoxSync.error_list_key(SESSION))
        .unwrap()
        .is_empty());
}
