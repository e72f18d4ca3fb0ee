//! Integration tests for the admin API client and user sync

use serde_json::json;
use sharedbox_sync::config::ApiConfig;
use sharedbox_sync::gateway::{AdminApiClient, FetchError, FetchGateway};
use sharedbox_sync::sink::BatchSettings;
use sharedbox_sync::storage::{open_storage, Collection};
use sharedbox_sync::users::sync_users;
use sharedbox_sync::SyncError;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> AdminApiClient {
    let config = ApiConfig {
        base_url: server.uri(),
        ..ApiConfig::default()
    };
    AdminApiClient::new(&config, "secret-token".to_string()).unwrap()
}

fn batch_settings() -> BatchSettings {
    BatchSettings {
        batch_size: 2,
        flush_interval: Duration::from_secs(3),
        write_timeout: Duration::from_secs(15),
    }
}

#[tokio::test]
async fn test_request_carries_token_and_lang() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sharedboxes/lists"))
        .and(header("access_token", "secret-token"))
        .and(query_param("lang", "eng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "total": 1,
            "lists": [{
                "name": "Sales",
                "node": "n1",
                "url": "https://x/n1",
                "drive_path": "/Shared/Sales"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let items = client_for(&mock_server).fetch_children("").await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].node, "n1");
    assert_eq!(items[0].name, "Sales");
}

#[tokio::test]
async fn test_child_listing_uses_node_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sharedboxes/lists/abc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "total": 0, "lists": []})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let items = client_for(&mock_server)
        .fetch_children("abc123")
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_non_2xx_is_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("token expired"))
        .mount(&mock_server)
        .await;

    match client_for(&mock_server).fetch_children("").await {
        Err(FetchError::Status { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "token expired");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unsuccessful_envelope() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": false, "lists": []})),
        )
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).fetch_children("n1").await;
    assert!(matches!(result, Err(FetchError::Unsuccessful { .. })));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let result = client_for(&mock_server).fetch_children("").await;
    assert!(matches!(result, Err(FetchError::Decode { .. })));
}

#[tokio::test]
async fn test_user_sync_upserts_by_user_seq() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    Mock::given(method("GET"))
        .and(path("/users/lists"))
        .and(header("access_token", "secret-token"))
        .and(query_param("lang", "eng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "total": 4,
            "lists": [
                {"user_seq": 1, "name": "Kim", "email": "kim@example.com"},
                {"user_seq": "2", "name": "Lee"},
                {"user_seq": 3, "name": "Park", "groups": ["admin"]},
                {"name": "orphan"}
            ]
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);

    let first = sync_users(&client, &store, &batch_settings()).await.unwrap();
    assert_eq!(first.listed, 4);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.batches, 2);
    assert_eq!(first.upserts.inserted, 3);

    let second = sync_users(&client, &store, &batch_settings()).await.unwrap();
    assert_eq!(second.upserts.inserted, 0);
    assert_eq!(second.upserts.replaced, 3);

    assert_eq!(store.count(Collection::Users).unwrap(), 3);
    let park = store.get_user("3").unwrap().unwrap();
    assert_eq!(park.0["groups"], json!(["admin"]));
}

#[tokio::test]
async fn test_user_sync_fetch_failure_is_fatal() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let store = open_storage(dir.path().join("sync.db").as_path()).unwrap();

    Mock::given(method("GET"))
        .and(path("/users/lists"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let result = sync_users(&client_for(&mock_server), &store, &batch_settings()).await;
    assert!(matches!(
        result,
        Err(SyncError::Fetch(FetchError::Status { status: 500, .. }))
    ));
    assert_eq!(store.count(Collection::Users).unwrap(), 0);
}
