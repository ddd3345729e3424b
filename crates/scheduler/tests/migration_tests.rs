mod common;

use common::{fast_worker, memory_store, seed_post};
use konakore_scheduler::LikeMigration;

#[tokio::test]
async fn markers_migrate_only_for_synced_posts() {
    let (_mem, store) = memory_store();
    seed_post(store.as_ref(), 1, "a").await;
    seed_post(store.as_ref(), 3, "a").await;
    for id in [1, 2, 3] {
        store.insert_legacy_like(id).await.unwrap();
    }

    let mut migration = LikeMigration::new(store.clone(), fast_worker(100));
    let outcome = migration.run_batch().await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.deferred, 1);

    assert!(store.get_post(1).await.unwrap().unwrap().is_liked);
    assert!(store.get_post(3).await.unwrap().unwrap().is_liked);
    assert_eq!(store.get_legacy_likes(None, 10).await.unwrap(), vec![2]);

    // Once post 2 shows up the marker drains on the next pass.
    seed_post(store.as_ref(), 2, "a").await;
    assert_eq!(migration.run_batch().await.unwrap().processed, 1);
    assert!(store.get_legacy_likes(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_marker_stays_for_retry() {
    let (mem, store) = memory_store();
    seed_post(store.as_ref(), 1, "a").await;
    seed_post(store.as_ref(), 2, "a").await;
    store.insert_legacy_like(1).await.unwrap();
    store.insert_legacy_like(2).await.unwrap();
    mem.fail_writes_for_post(2);

    let mut migration = LikeMigration::new(store.clone(), fast_worker(100));
    let outcome = migration.run_batch().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(store.get_legacy_likes(None, 10).await.unwrap(), vec![2]);
    assert!(!store.get_post(2).await.unwrap().unwrap().is_liked);
}

#[tokio::test]
async fn batches_walk_newest_first() {
    let (_mem, store) = memory_store();
    for id in 1..=5 {
        store.insert_legacy_like(id).await.unwrap();
    }

    let mut migration = LikeMigration::new(store.clone(), fast_worker(2));
    let first = migration.run_batch().await.unwrap();
    assert_eq!(first.fetched, 2);
    assert!(!first.wrapped);
    let second = migration.run_batch().await.unwrap();
    assert_eq!(second.fetched, 2);
    let third = migration.run_batch().await.unwrap();
    assert_eq!(third.fetched, 1);
    assert!(third.wrapped);
}
