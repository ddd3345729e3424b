use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use konakore_remote::{TriggerAction, TriggerClient, UrlProbe};
use serde_json::json;
use std::net::TcpListener;
use std::time::Duration;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[tokio::test]
async fn trigger_posts_action() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/trigger")
                .json_body(json!({"action": "status"}));
            then.status(200)
                .json_body(json!({"status": "stopped", "message": "file sync is not running"}));
        })
        .await;

    let client = TriggerClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
    let response = client.trigger(TriggerAction::Status).await.unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, "stopped");
}

#[tokio::test]
async fn health_decodes_response() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200)
                .json_body(json!({"status": "healthy", "sync_running": true, "timestamp": 1700000000}));
        })
        .await;

    let client = TriggerClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
    let health = client.health().await.unwrap();
    assert!(health.sync_running);
    assert_eq!(health.timestamp, 1_700_000_000);
}

#[tokio::test]
async fn notify_swallows_failures() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/trigger");
            then.status(500);
        })
        .await;

    let client = TriggerClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
    client.notify().await;
    mock.assert_async().await;
}

#[tokio::test]
async fn probe_requires_success() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/ok.jpg");
            then.status(200).header("content-length", "2048");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/gone.jpg");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(httpmock::Method::HEAD).path("/empty.jpg");
            then.status(204);
        })
        .await;

    let probe = UrlProbe::new(Duration::from_secs(5));
    assert!(probe.is_reachable(&server.url("/ok.jpg")).await);
    assert!(!probe.is_reachable(&server.url("/gone.jpg")).await);
    assert!(!probe.is_reachable(&server.url("/empty.jpg")).await);

    let err = probe.head(&server.url("/empty.jpg")).await.unwrap_err();
    assert!(matches!(err, konakore_remote::RemoteError::Status { status: 204, .. }));
}
