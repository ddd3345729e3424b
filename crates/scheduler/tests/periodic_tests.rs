mod common;

use common::{can_bind_localhost, memory_store, tag};
use httpmock::Method::GET;
use httpmock::MockServer;
use konakore_core::config::{RecentConfig, TagSyncConfig};
use konakore_core::{JobName, RecentState, TagSyncState};
use konakore_metadata::{load_job_state, save_job_state};
use konakore_remote::CatalogClient;
use konakore_scheduler::{RecentRefresh, TagSyncWorker};
use serde_json::json;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

fn tag_config() -> TagSyncConfig {
    TagSyncConfig {
        batch_size: 2,
        batch_pause_ms: 0,
        ..TagSyncConfig::default()
    }
}

#[tokio::test]
async fn recent_refresh_rotates_through_window() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json");
            then.status(200).json_body(json!([{"id": 1, "tags": "a"}]));
        })
        .await;

    let (_mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let refresh = RecentRefresh::new(
        store.clone(),
        catalog,
        RecentConfig {
            page_window: 3,
            ..RecentConfig::default()
        },
    );

    let mut pages = Vec::new();
    for _ in 0..4 {
        pages.push(refresh.run_once().await.unwrap());
    }
    assert_eq!(pages, vec![1, 2, 3, 1]);

    let state: RecentState = load_job_state(store.as_ref(), JobName::RecentRefresh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.current_page, 2);
}

#[tokio::test]
async fn recent_refresh_swallows_fetch_errors() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json");
            then.status(500);
        })
        .await;

    let (_mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let refresh = RecentRefresh::new(store.clone(), catalog, RecentConfig::default());

    assert_eq!(refresh.run_once().await.unwrap(), 1);
    assert_eq!(refresh.run_once().await.unwrap(), 2);
}

#[tokio::test]
async fn tag_sync_inserts_updates_and_records_state() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/tag.json").query_param("limit", "0");
            then.status(200).json_body(json!([
                {"id": 1, "name": "sky", "count": 11, "type": 0, "ambiguous": false},
                {"id": 2, "name": "sea", "count": 1, "type": 0, "ambiguous": false},
                {"id": 3, "name": "artist_x", "count": 4, "type": 1, "ambiguous": false}
            ]));
        })
        .await;

    let (_mem, store) = memory_store();
    // Existing rows: one stale, one unchanged.
    let mut stale = tag(1, "sky");
    stale.count = 10;
    store.insert_tag(&stale).await.unwrap();
    store.insert_tag(&tag(2, "sea")).await.unwrap();

    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = TagSyncWorker::new(store.clone(), catalog, tag_config());
    assert!(worker.due_on_startup().await.unwrap());

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.failed, 0);

    let rows = store.get_tags_by_ids(&[1, 3]).await.unwrap();
    assert!(rows.iter().any(|r| r.id == 1 && r.count == 11));
    assert!(rows.iter().any(|r| r.id == 3 && r.tag_type == 1));

    let state: TagSyncState = load_job_state(store.as_ref(), JobName::TagSync)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.last_sync_count, 3);
    assert_eq!(state.last_sync_new, 1);
    assert_eq!(state.last_sync_updated, 1);
    assert!(state.last_completed_at.is_some());
    assert!(!worker.due_on_startup().await.unwrap());
}

#[tokio::test]
async fn stale_tag_sync_is_due_on_startup() {
    let (_mem, store) = memory_store();
    let old = TagSyncState {
        last_completed_at: Some(OffsetDateTime::now_utc() - time::Duration::days(8)),
        ..TagSyncState::default()
    };
    save_job_state(store.as_ref(), JobName::TagSync, &old)
        .await
        .unwrap();

    let catalog = CatalogClient::new("http://127.0.0.1:9", 100).unwrap();
    let worker = TagSyncWorker::new(store, catalog, tag_config());
    assert!(worker.due_on_startup().await.unwrap());
}
