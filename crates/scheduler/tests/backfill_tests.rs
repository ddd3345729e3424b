mod common;

use common::{can_bind_localhost, memory_store};
use httpmock::Method::GET;
use httpmock::MockServer;
use konakore_core::config::BackfillConfig;
use konakore_core::{BackfillState, JobName};
use konakore_metadata::load_job_state;
use konakore_remote::CatalogClient;
use konakore_scheduler::{BackfillStep, BackfillWorker, ingest_page};
use serde_json::json;
use std::time::Duration;

fn config() -> BackfillConfig {
    BackfillConfig {
        enabled: true,
        initial_interval_secs: 10,
        max_interval_secs: 30,
        retry_interval_secs: 60,
    }
}

#[tokio::test]
async fn backfill_walks_pages_until_empty() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    for page in 1..=3 {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/post.json")
                    .query_param("page", page.to_string());
                then.status(200)
                    .json_body(json!([{"id": page * 10, "tags": "a"}, {"id": page * 10 + 1, "tags": "b"}]));
            })
            .await;
    }
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json").query_param("page", "4");
            then.status(200).json_body(json!([]));
        })
        .await;

    let (_mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = BackfillWorker::new(store.clone(), catalog, config());

    let mut state = worker.load_state().await.unwrap();
    assert_eq!(state, BackfillState::initial(10));

    let mut delays = Vec::new();
    loop {
        match worker.step(&mut state).await.unwrap() {
            BackfillStep::Advanced { delay, stored, .. } => {
                assert_eq!(stored, 2);
                delays.push(delay);
            }
            BackfillStep::Completed { page } => {
                assert_eq!(page, 4);
                break;
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    // Doubling, capped at the configured ceiling.
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(30)
        ]
    );

    let persisted: BackfillState = load_job_state(store.as_ref(), JobName::Backfill)
        .await
        .unwrap()
        .unwrap();
    assert!(persisted.is_completed());
    assert_eq!(persisted.current_page, 4);
    assert_eq!(store.post_counts().await.unwrap().total, 6);
}

#[tokio::test]
async fn fetch_error_retries_same_page() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json");
            then.status(503);
        })
        .await;

    let (_mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = BackfillWorker::new(store.clone(), catalog, config());

    let mut state = BackfillState::initial(10);
    state.current_page = 7;
    let step = worker.step(&mut state).await.unwrap();

    match step {
        BackfillStep::Retry { page, delay, .. } => {
            assert_eq!(page, 7);
            assert_eq!(delay, Duration::from_secs(60));
        }
        other => panic!("unexpected step {other:?}"),
    }
    assert_eq!(state.current_page, 7);
    assert!(
        load_job_state::<BackfillState, _>(store.as_ref(), JobName::Backfill)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn refused_record_is_skipped_and_page_advances() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json").query_param("page", "1");
            then.status(200).json_body(json!([
                {"id": 10, "tags": "a"},
                {"id": 11, "tags": "b"},
                {"id": 12, "tags": "c"}
            ]));
        })
        .await;

    let (mem, store) = memory_store();
    mem.fail_writes_for_post(11);
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = BackfillWorker::new(store.clone(), catalog, config());

    let mut state = worker.load_state().await.unwrap();
    match worker.step(&mut state).await.unwrap() {
        BackfillStep::Advanced { page, stored, .. } => {
            assert_eq!(page, 1);
            assert_eq!(stored, 2);
        }
        other => panic!("unexpected step {other:?}"),
    }

    assert!(store.get_post(10).await.unwrap().is_some());
    assert!(store.get_post(11).await.unwrap().is_none());
    assert!(store.get_post(12).await.unwrap().is_some());

    let persisted: BackfillState = load_job_state(store.as_ref(), JobName::Backfill)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.current_page, 2);
}

#[tokio::test]
async fn failed_state_write_keeps_cursor_and_stops() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    for page in 1..=2 {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/post.json")
                    .query_param("page", page.to_string());
                then.status(200).json_body(json!([{"id": page, "tags": "a"}]));
            })
            .await;
    }

    let (mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = BackfillWorker::new(store.clone(), catalog.clone(), config());

    let mut state = worker.load_state().await.unwrap();
    worker.step(&mut state).await.unwrap();
    assert_eq!(state.current_page, 2);

    mem.fail_job_state_writes();
    assert!(worker.step(&mut state).await.is_err());
    assert_eq!(state.current_page, 2);

    // The whole worker gives up instead of moving past the page.
    let worker = BackfillWorker::new(store.clone(), catalog, config());
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        worker.run(tokio_util::sync::CancellationToken::new()),
    )
    .await
    .expect("worker stops on its own");
    assert!(result.is_err());

    mem.clear_write_failures();
    let persisted: BackfillState = load_job_state(store.as_ref(), JobName::Backfill)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.current_page, 2);
    assert!(!persisted.is_completed());
    assert!(store.try_acquire_lock("backfill-all").await.unwrap().is_some());
}

#[tokio::test]
async fn reingesting_a_page_is_idempotent_but_resets_processed() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    let payload = json!([{"id": 42, "tags": "a b", "file_url": "https://x/42.png"}]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json");
            then.status(200).json_body(payload.clone());
        })
        .await;

    let (_mem, store) = memory_store();
    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();

    ingest_page(store.as_ref(), &catalog, 1).await.unwrap();
    store.link_post_tags(42, &[]).await.ok();
    let first = store.get_post(42).await.unwrap().unwrap();

    ingest_page(store.as_ref(), &catalog, 1).await.unwrap();
    let second = store.get_post(42).await.unwrap().unwrap();

    assert_eq!(store.post_counts().await.unwrap().total, 1);
    assert_eq!(first.raw_data, second.raw_data);
    assert_eq!(second.raw_data, payload[0]);
    assert!(!second.is_processed);
}

#[tokio::test]
async fn completed_backfill_does_not_fetch() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/post.json");
            then.status(200).json_body(json!([]));
        })
        .await;

    let (_mem, store) = memory_store();
    let mut done = BackfillState::initial(10);
    done.complete();
    konakore_metadata::save_job_state(store.as_ref(), JobName::Backfill, &done)
        .await
        .unwrap();

    let catalog = CatalogClient::new(&server.base_url(), 100).unwrap();
    let worker = BackfillWorker::new(store, catalog, config());
    worker
        .run(tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.hits_async().await, 0);
}
