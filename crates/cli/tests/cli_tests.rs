#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use predicates::str::contains;
use std::net::TcpListener;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn konactl() -> Command {
    let mut cmd = Command::cargo_bin("konactl").unwrap();
    cmd.env("KONAKORE_CONFIG", "/nonexistent/konakore.toml");
    cmd
}

#[test]
fn help_lists_commands() {
    konactl()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("like"))
        .stdout(contains("trigger"))
        .stdout(contains("stats"));
}

#[test]
fn trigger_rejects_unknown_action() {
    konactl()
        .args(["trigger", "restart"])
        .assert()
        .failure()
        .stderr(contains("invalid action"));
}

#[test]
fn trigger_status_prints_listener_reply() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/trigger")
            .json_body(serde_json::json!({"action": "status"}));
        then.status(200).json_body(serde_json::json!({
            "status": "running",
            "message": "Sync process is active"
        }));
    });

    konactl()
        .args(["trigger", "status", "--listener", &server.base_url()])
        .assert()
        .success()
        .stdout(contains("running: Sync process is active"));
    mock.assert();
}

#[test]
fn health_uses_notifier_url_from_env() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(serde_json::json!({
            "status": "healthy",
            "sync_running": false,
            "timestamp": 1_700_000_000
        }));
    });

    konactl()
        .env("KONAKORE_NOTIFIER__FILE_SYNC_URL", server.base_url())
        .arg("health")
        .assert()
        .success()
        .stdout(contains("Status: healthy"))
        .stdout(contains("Sync running: no"));
}

#[test]
fn listener_errors_fail_the_command() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/trigger");
        then.status(500);
    });

    konactl()
        .args(["trigger", "--listener", &server.base_url()])
        .assert()
        .failure();
}
