use futures::{SinkExt, StreamExt};
use httpmock::Method::POST;
use httpmock::MockServer;
use konakore_remote::{AddUriOptions, DaemonClient, RemoteError};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn options() -> AddUriOptions {
    AddUriOptions {
        dir: "/wallpaper/00".into(),
        out: "Konachan.com - 7 sky.jpg".into(),
    }
}

#[tokio::test]
async fn http_add_uri_returns_gid_and_audit() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/jsonrpc")
                .body_contains("\"aria2.addUri\"")
                .body_contains("\"token:secret\"")
                .body_contains("\"out\":\"Konachan.com - 7 sky.jpg\"");
            then.status(200)
                .json_body(json!({"jsonrpc": "2.0", "id": "konakore-1", "result": "2089b05ecca3d829"}));
        })
        .await;

    let client = DaemonClient::new(
        &server.url("/jsonrpc"),
        Some("secret".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    let submission = client
        .add_uri("https://cdn.example/jpeg/7.jpg", &options())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(submission.gid, "2089b05ecca3d829");
    assert_eq!(submission.audit["gid"], "2089b05ecca3d829");
    assert_eq!(submission.audit["method"], "aria2.addUri");
    assert_eq!(
        submission.audit["params"],
        json!([["https://cdn.example/jpeg/7.jpg"], {"dir": "/wallpaper/00", "out": "Konachan.com - 7 sky.jpg"}])
    );
    assert!(!submission.audit.to_string().contains("secret"));
}

#[tokio::test]
async fn http_rpc_error_is_reported() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/jsonrpc");
            then.status(400).json_body(json!({
                "jsonrpc": "2.0",
                "id": "konakore-1",
                "error": {"code": 1, "message": "Unauthorized"}
            }));
        })
        .await;

    let client =
        DaemonClient::new(&server.url("/jsonrpc"), None, Duration::from_secs(5)).unwrap();
    let err = client
        .add_uri("https://cdn.example/7.png", &options())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Rpc { code: 1, .. }));
}

#[tokio::test]
async fn http_daemon_down_is_status_error() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/jsonrpc");
            then.status(503).body("unavailable");
        })
        .await;

    let client =
        DaemonClient::new(&server.url("/jsonrpc"), None, Duration::from_secs(5)).unwrap();
    let err = client
        .add_uri("https://cdn.example/7.png", &options())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 503, .. }));
}

#[tokio::test]
async fn websocket_add_uri_skips_notifications() {
    if !can_bind_localhost() {
        return;
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let request = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break serde_json::from_str::<Value>(&text).unwrap(),
                _ => continue,
            }
        };
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "aria2.onDownloadStart",
            "params": [{"gid": "other"}]
        });
        ws.send(Message::Text(notification.to_string().into()))
            .await
            .unwrap();
        let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": "abc123"});
        ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        request
    });

    let client = DaemonClient::new(
        &format!("ws://{addr}/jsonrpc"),
        Some("tok".into()),
        Duration::from_secs(5),
    )
    .unwrap();
    let submission = client
        .add_uri("https://cdn.example/7.png", &options())
        .await
        .unwrap();
    assert_eq!(submission.gid, "abc123");

    let request = server.await.unwrap();
    assert_eq!(request["method"], "aria2.addUri");
    assert_eq!(request["params"][0], "token:tok");
    assert_eq!(request["params"][1], json!(["https://cdn.example/7.png"]));
}

#[tokio::test]
async fn websocket_connect_failure_is_websocket_error() {
    if !can_bind_localhost() {
        return;
    }
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = DaemonClient::new(
        &format!("ws://127.0.0.1:{port}/jsonrpc"),
        None,
        Duration::from_secs(2),
    )
    .unwrap();
    let err = client
        .add_uri("https://cdn.example/7.png", &options())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::WebSocket(_)), "got {err:?}");
}
