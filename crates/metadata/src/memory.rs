//! In-process metadata store.
//!
//! Mirrors the PostgreSQL semantics closely enough for worker and
//! orchestrator tests: upserts reset `is_processed`, edge inserts ignore
//! duplicates, a post has at most one live file sync entry, and job locks are
//! exclusive until released or dropped.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{
    FileSyncRepo, JobLock, JobStateRepo, LegacyLikeRepo, LockHandle, LockRepo, PostRepo,
    PostTagRepo, TagRepo,
};
use crate::store::MetadataStore;
use async_trait::async_trait;
use konakore_core::{FileSyncStatus, RemoteTag};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Default)]
struct Tables {
    posts: BTreeMap<i64, PostRow>,
    tags: BTreeMap<i64, TagRow>,
    post_tags: BTreeSet<(i64, i64)>,
    likes: BTreeSet<i64>,
    job_state: BTreeMap<String, JobStateRow>,
    file_sync: BTreeMap<i64, FileSyncRow>,
    next_file_sync_id: i64,
    #[cfg(any(test, feature = "test-util"))]
    faults: Faults,
}

/// Injected failures for exercising error paths.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
struct Faults {
    posts: HashSet<i64>,
    lookups: bool,
    job_state: bool,
}

#[cfg(any(test, feature = "test-util"))]
impl Tables {
    fn check_post_write(&self, post_id: i64) -> MetadataResult<()> {
        if self.faults.posts.contains(&post_id) {
            return Err(MetadataError::Internal(format!(
                "injected write failure for post {post_id}"
            )));
        }
        Ok(())
    }

    fn check_lookup(&self) -> MetadataResult<()> {
        if self.faults.lookups {
            return Err(MetadataError::Internal("injected lookup failure".to_string()));
        }
        Ok(())
    }

    fn check_job_state_write(&self) -> MetadataResult<()> {
        if self.faults.job_state {
            return Err(MetadataError::Internal(
                "injected job state write failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(any(test, feature = "test-util")))]
impl Tables {
    fn check_post_write(&self, _post_id: i64) -> MetadataResult<()> {
        Ok(())
    }

    fn check_lookup(&self) -> MetadataResult<()> {
        Ok(())
    }

    fn check_job_state_write(&self) -> MetadataResult<()> {
        Ok(())
    }
}

/// In-memory metadata store for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<Mutex<HashSet<String>>>,
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> MetadataResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| MetadataError::Internal("memory store mutex poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl MemoryStore {
    /// Make every write touching `post_id` fail until cleared.
    ///
    /// Covers post upserts, edge linking and like migration.
    pub fn fail_writes_for_post(&self, post_id: i64) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.faults.posts.insert(post_id);
        }
    }

    /// Make liked-status lookups fail until cleared.
    pub fn fail_liked_lookups(&self) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.faults.lookups = true;
        }
    }

    /// Make job state writes fail until cleared.
    pub fn fail_job_state_writes(&self) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.faults.job_state = true;
        }
    }

    pub fn clear_write_failures(&self) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.faults = Faults::default();
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn migrate(&self) -> MetadataResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        lock_mutex(&self.tables).map(|_| ())
    }
}

// =============================================================================
// Locks
// =============================================================================

struct MemoryLock {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for MemoryLock {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.name);
        }
    }
}

#[async_trait]
impl LockHandle for MemoryLock {
    async fn release(self: Box<Self>) -> MetadataResult<()> {
        // Drop removes the name from the held set.
        Ok(())
    }
}

#[async_trait]
impl LockRepo for MemoryStore {
    async fn try_acquire_lock(&self, name: &str) -> MetadataResult<Option<JobLock>> {
        let mut held = lock_mutex(&self.locks)?;
        if !held.insert(name.to_string()) {
            return Ok(None);
        }
        Ok(Some(JobLock::new(
            name,
            Box::new(MemoryLock {
                name: name.to_string(),
                held: self.locks.clone(),
            }),
        )))
    }
}

// =============================================================================
// Job state
// =============================================================================

#[async_trait]
impl JobStateRepo for MemoryStore {
    async fn get_job_state(&self, job_name: &str) -> MetadataResult<Option<JobStateRow>> {
        Ok(lock_mutex(&self.tables)?.job_state.get(job_name).cloned())
    }

    async fn set_job_state(&self, job_name: &str, state: &Value) -> MetadataResult<()> {
        let mut tables = lock_mutex(&self.tables)?;
        tables.check_job_state_write()?;
        tables.job_state.insert(
            job_name.to_string(),
            JobStateRow {
                job_name: job_name.to_string(),
                state: state.clone(),
                last_run_at: Some(OffsetDateTime::now_utc()),
            },
        );
        Ok(())
    }

    async fn list_job_states(&self) -> MetadataResult<Vec<JobStateRow>> {
        Ok(lock_mutex(&self.tables)?
            .job_state
            .values()
            .cloned()
            .collect())
    }
}

// =============================================================================
// Posts
// =============================================================================

#[async_trait]
impl PostRepo for MemoryStore {
    async fn upsert_posts(&self, posts: &[NewPost]) -> MetadataResult<UpsertReport> {
        let mut tables = lock_mutex(&self.tables)?;
        let now = OffsetDateTime::now_utc();
        let mut report = UpsertReport::default();
        for post in posts {
            if tables.check_post_write(post.id).is_err() {
                report.rejected.push(post.id);
                continue;
            }
            report.stored += 1;
            tables
                .posts
                .entry(post.id)
                .and_modify(|row| {
                    row.raw_data = post.raw_data.clone();
                    row.last_synced_at = now;
                    row.is_processed = false;
                })
                .or_insert_with(|| PostRow {
                    id: post.id,
                    raw_data: post.raw_data.clone(),
                    is_processed: false,
                    is_liked: false,
                    last_synced_at: now,
                });
        }
        Ok(report)
    }

    async fn get_post(&self, id: i64) -> MetadataResult<Option<PostRow>> {
        Ok(lock_mutex(&self.tables)?.posts.get(&id).cloned())
    }

    async fn get_unprocessed_posts(
        &self,
        after_id: i64,
        limit: i64,
    ) -> MetadataResult<Vec<PostRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .posts
            .range(after_id.saturating_add(1)..)
            .map(|(_, row)| row)
            .filter(|row| !row.is_processed)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn existing_post_ids(&self, ids: &[i64]) -> MetadataResult<Vec<i64>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.posts.contains_key(id))
            .collect())
    }

    async fn set_post_liked(&self, id: i64, liked: bool) -> MetadataResult<bool> {
        let mut tables = lock_mutex(&self.tables)?;
        match tables.posts.get_mut(&id) {
            Some(row) => {
                row.is_liked = liked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn liked_status(&self, ids: &[i64]) -> MetadataResult<HashMap<i64, bool>> {
        let tables = lock_mutex(&self.tables)?;
        tables.check_lookup()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.posts.get(id).map(|row| (*id, row.is_liked)))
            .collect())
    }

    async fn post_counts(&self) -> MetadataResult<PostCounts> {
        let tables = lock_mutex(&self.tables)?;
        let mut counts = PostCounts::default();
        for row in tables.posts.values() {
            counts.total += 1;
            counts.processed += i64::from(row.is_processed);
            counts.liked += i64::from(row.is_liked);
        }
        Ok(counts)
    }
}

// =============================================================================
// Tags
// =============================================================================

fn tag_row(tag: &RemoteTag) -> TagRow {
    TagRow {
        id: tag.id,
        name: tag.name.clone(),
        count: tag.count,
        tag_type: tag.tag_type,
        ambiguous: tag.ambiguous,
        last_synced_at: OffsetDateTime::now_utc(),
    }
}

fn name_taken(tables: &Tables, name: &str, except_id: i64) -> bool {
    tables
        .tags
        .values()
        .any(|row| row.name == name && row.id != except_id)
}

#[async_trait]
impl TagRepo for MemoryStore {
    async fn get_tags_by_ids(&self, ids: &[i64]) -> MetadataResult<Vec<TagRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.tags.get(id).cloned())
            .collect())
    }

    async fn insert_tag(&self, tag: &RemoteTag) -> MetadataResult<()> {
        let mut tables = lock_mutex(&self.tables)?;
        if tables.tags.contains_key(&tag.id) || name_taken(&tables, &tag.name, tag.id) {
            return Err(MetadataError::Constraint(format!(
                "tag {} ({}) already exists",
                tag.id, tag.name
            )));
        }
        tables.tags.insert(tag.id, tag_row(tag));
        Ok(())
    }

    async fn update_tag(&self, tag: &RemoteTag) -> MetadataResult<()> {
        let mut tables = lock_mutex(&self.tables)?;
        if name_taken(&tables, &tag.name, tag.id) {
            return Err(MetadataError::Constraint(format!(
                "tag name {} already in use",
                tag.name
            )));
        }
        if tables.tags.contains_key(&tag.id) {
            tables.tags.insert(tag.id, tag_row(tag));
        }
        Ok(())
    }

    async fn resolve_tag_names(&self, names: &[String]) -> MetadataResult<HashMap<String, i64>> {
        let tables = lock_mutex(&self.tables)?;
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(tables
            .tags
            .values()
            .filter(|row| wanted.contains(row.name.as_str()))
            .map(|row| (row.name.clone(), row.id))
            .collect())
    }

    async fn count_tags(&self) -> MetadataResult<i64> {
        Ok(lock_mutex(&self.tables)?.tags.len() as i64)
    }
}

// =============================================================================
// Post tags
// =============================================================================

#[async_trait]
impl PostTagRepo for MemoryStore {
    async fn link_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> MetadataResult<()> {
        let mut tables = lock_mutex(&self.tables)?;
        tables.check_post_write(post_id)?;
        if !tables.posts.contains_key(&post_id) {
            return Err(MetadataError::NotFound(format!("post {post_id}")));
        }
        if let Some(missing) = tag_ids.iter().find(|id| !tables.tags.contains_key(*id)) {
            return Err(MetadataError::Constraint(format!(
                "tag {missing} does not exist"
            )));
        }
        for tag_id in tag_ids {
            tables.post_tags.insert((post_id, *tag_id));
        }
        if let Some(row) = tables.posts.get_mut(&post_id) {
            row.is_processed = true;
        }
        Ok(())
    }

    async fn get_post_tag_ids(&self, post_id: i64) -> MetadataResult<Vec<i64>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .post_tags
            .range((post_id, i64::MIN)..=(post_id, i64::MAX))
            .map(|(_, tag_id)| *tag_id)
            .collect())
    }

    async fn count_post_tags(&self) -> MetadataResult<i64> {
        Ok(lock_mutex(&self.tables)?.post_tags.len() as i64)
    }
}

// =============================================================================
// Legacy likes
// =============================================================================

#[async_trait]
impl LegacyLikeRepo for MemoryStore {
    async fn get_legacy_likes(
        &self,
        before_id: Option<i64>,
        limit: i64,
    ) -> MetadataResult<Vec<i64>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .likes
            .iter()
            .rev()
            .copied()
            .filter(|id| before_id.is_none_or(|before| *id < before))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_legacy_like(&self, id: i64) -> MetadataResult<()> {
        lock_mutex(&self.tables)?.likes.insert(id);
        Ok(())
    }

    async fn migrate_legacy_like(&self, id: i64) -> MetadataResult<bool> {
        let mut tables = lock_mutex(&self.tables)?;
        tables.check_post_write(id)?;
        match tables.posts.get_mut(&id) {
            Some(row) => {
                row.is_liked = true;
                tables.likes.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// File sync
// =============================================================================

fn has_live_entry(tables: &Tables, post_id: i64) -> bool {
    tables
        .file_sync
        .values()
        .any(|row| row.post_id == post_id && row.sync_status != FileSyncStatus::Deleted.as_str())
}

#[async_trait]
impl FileSyncRepo for MemoryStore {
    async fn liked_posts_without_file(&self, limit: i64) -> MetadataResult<Vec<PostRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .posts
            .values()
            .rev()
            .filter(|row| row.is_liked && !has_live_entry(&tables, row.id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_file_sync(&self, entry: &NewFileSync) -> MetadataResult<i64> {
        let mut tables = lock_mutex(&self.tables)?;
        if !tables.posts.contains_key(&entry.post_id) {
            return Err(MetadataError::NotFound(format!("post {}", entry.post_id)));
        }
        if entry.status.is_live() && has_live_entry(&tables, entry.post_id) {
            return Err(MetadataError::Constraint(format!(
                "post {} already has a live file sync entry",
                entry.post_id
            )));
        }
        tables.next_file_sync_id += 1;
        let id = tables.next_file_sync_id;
        let now = OffsetDateTime::now_utc();
        tables.file_sync.insert(
            id,
            FileSyncRow {
                id,
                post_id: entry.post_id,
                download_url: entry.download_url.clone(),
                expected_size: entry.expected_size,
                actual_size: entry.actual_size,
                file_ext: Some(entry.file_ext.clone()),
                file_path: entry.file_path.clone(),
                aria_log: entry.aria_log.clone(),
                sync_status: entry.status.as_str().to_string(),
                is_deleted: entry.status == FileSyncStatus::Deleted,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_downloading_entries(&self) -> MetadataResult<Vec<FileSyncRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .file_sync
            .values()
            .filter(|row| row.sync_status == FileSyncStatus::Downloading.as_str())
            .cloned()
            .collect())
    }

    async fn mark_file_sync_complete(&self, id: i64, actual_size: i64) -> MetadataResult<bool> {
        let mut tables = lock_mutex(&self.tables)?;
        match tables.file_sync.get_mut(&id) {
            Some(row) if row.sync_status == FileSyncStatus::Downloading.as_str() => {
                row.sync_status = FileSyncStatus::Complete.as_str().to_string();
                row.actual_size = Some(actual_size);
                row.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_reclaimable_entries(&self) -> MetadataResult<Vec<FileSyncRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .file_sync
            .values()
            .filter(|row| {
                row.sync_status == FileSyncStatus::Complete.as_str()
                    && !row.is_deleted
                    && tables
                        .posts
                        .get(&row.post_id)
                        .is_some_and(|post| !post.is_liked)
            })
            .cloned()
            .collect())
    }

    async fn mark_file_sync_deleted(&self, id: i64) -> MetadataResult<bool> {
        let mut tables = lock_mutex(&self.tables)?;
        match tables.file_sync.get_mut(&id) {
            Some(row) if row.sync_status == FileSyncStatus::Complete.as_str() => {
                row.sync_status = FileSyncStatus::Deleted.as_str().to_string();
                row.is_deleted = true;
                row.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_file_sync_entries(&self, post_id: i64) -> MetadataResult<Vec<FileSyncRow>> {
        let tables = lock_mutex(&self.tables)?;
        Ok(tables
            .file_sync
            .values()
            .filter(|row| row.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn file_sync_counts(&self) -> MetadataResult<Vec<(String, i64)>> {
        let tables = lock_mutex(&self.tables)?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for row in tables.file_sync.values() {
            *counts.entry(row.sync_status.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(id: i64) -> NewPost {
        NewPost {
            id,
            raw_data: json!({"id": id, "tags": "a b"}),
        }
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let first = store.try_acquire_lock("process-post-tags").await.unwrap();
        assert!(first.is_some());
        assert!(
            store
                .try_acquire_lock("process-post-tags")
                .await
                .unwrap()
                .is_none()
        );
        // Different names do not contend.
        assert!(store.try_acquire_lock("process-likes").await.unwrap().is_some());

        first.unwrap().release().await.unwrap();
        assert!(
            store
                .try_acquire_lock("process-post-tags")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_dropped_lock_is_released() {
        let store = MemoryStore::new();
        {
            let _lock = store.try_acquire_lock("sync-tags").await.unwrap().unwrap();
        }
        assert!(store.try_acquire_lock("sync-tags").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_resets_processed() {
        let store = MemoryStore::new();
        store.upsert_posts(&[post(1)]).await.unwrap();
        store.link_post_tags(1, &[]).await.unwrap();
        assert!(store.get_post(1).await.unwrap().unwrap().is_processed);

        store.upsert_posts(&[post(1)]).await.unwrap();
        let row = store.get_post(1).await.unwrap().unwrap();
        assert!(!row.is_processed);
        assert_eq!(store.post_counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_single_live_file_sync_entry() {
        let store = MemoryStore::new();
        store.upsert_posts(&[post(7)]).await.unwrap();
        let entry = NewFileSync {
            post_id: 7,
            download_url: None,
            expected_size: None,
            actual_size: Some(10),
            file_ext: "jpg".to_string(),
            file_path: "/tmp/x.jpg".to_string(),
            aria_log: None,
            status: FileSyncStatus::Complete,
        };
        let id = store.create_file_sync(&entry).await.unwrap();
        let err = store.create_file_sync(&entry).await.unwrap_err();
        assert!(err.is_constraint());

        assert!(store.mark_file_sync_deleted(id).await.unwrap());
        assert!(store.create_file_sync(&entry).await.is_ok());
        assert_eq!(store.get_file_sync_entries(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_legacy_likes_descending_with_cursor() {
        let store = MemoryStore::new();
        for id in [3, 9, 5, 1] {
            store.insert_legacy_like(id).await.unwrap();
        }
        assert_eq!(store.get_legacy_likes(None, 3).await.unwrap(), vec![9, 5, 3]);
        assert_eq!(store.get_legacy_likes(Some(3), 10).await.unwrap(), vec![1]);
    }
}
