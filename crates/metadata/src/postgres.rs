//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{
    FileSyncRepo, JobLock, JobStateRepo, LegacyLikeRepo, LockHandle, LockRepo, PostRepo,
    PostTagRepo, TagRepo,
};
use crate::store::MetadataStore;
use async_trait::async_trait;
use konakore_core::config::DatabaseConfig;
use konakore_core::{FileSyncStatus, RemoteTag};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, Pool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Map a unique violation on the live-entry index to a constraint error.
fn map_file_sync_insert_error(err: sqlx::Error, post_id: i64) -> MetadataError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.code().as_deref() == Some("23505")
    {
        return MetadataError::Constraint(format!(
            "post {post_id} already has a live file sync entry"
        ));
    }
    err.into()
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using the configured URL or individual fields, retrying with a
    /// fixed delay while the database is unreachable.
    pub async fn connect_with_retry(config: &DatabaseConfig) -> MetadataResult<Self> {
        let opts = Self::connect_options(config)?;
        let attempts = config.connect_attempts.max(1);

        let mut attempt = 1;
        loop {
            match Self::connect(
                opts.clone(),
                config.max_connections,
                config.statement_timeout_ms,
            )
            .await
            {
                Ok(store) => return Ok(store),
                Err(MetadataError::Database(e)) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        retry_in_secs = config.connect_retry_delay_secs,
                        error = %e,
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(config.connect_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts, error = %e, "Could not connect to the database");
                    return Err(e);
                }
            }
        }
    }

    fn connect_options(config: &DatabaseConfig) -> MetadataResult<PgConnectOptions> {
        if let Some(url) = &config.url {
            tracing::info!("Connecting to PostgreSQL using connection URL");
            return Ok(PgConnectOptions::from_str(url)?);
        }

        // Log connection info without password
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            username = %config.username,
            "Connecting to PostgreSQL"
        );

        let mut opts = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username);
        if !config.password.is_empty() {
            opts = opts.password(&config.password);
        }
        Ok(opts)
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // One prepared statement cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Advisory locks
// =============================================================================

/// Advisory lock held on a connection detached from the pool.
struct PgAdvisoryLock {
    name: String,
    conn: PgConnection,
}

#[async_trait]
impl LockHandle for PgAdvisoryLock {
    async fn release(self: Box<Self>) -> MetadataResult<()> {
        let PgAdvisoryLock { name, mut conn } = *self;
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&name)
            .fetch_one(&mut conn)
            .await?;
        if !released {
            tracing::warn!(lock = %name, "Advisory lock was not held at release");
        }
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl LockRepo for PostgresStore {
    async fn try_acquire_lock(&self, name: &str) -> MetadataResult<Option<JobLock>> {
        // The lock is bound to this session, so it must not go back to the pool.
        let mut conn = self.pool.acquire().await?.detach();
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(name)
            .fetch_one(&mut conn)
            .await?;

        if !acquired {
            if let Err(e) = conn.close().await {
                tracing::debug!(lock = %name, error = %e, "Failed to close lock probe connection");
            }
            return Ok(None);
        }

        tracing::debug!(lock = %name, "Acquired advisory lock");
        Ok(Some(JobLock::new(
            name,
            Box::new(PgAdvisoryLock {
                name: name.to_string(),
                conn,
            }),
        )))
    }
}

// =============================================================================
// Job state
// =============================================================================

#[async_trait]
impl JobStateRepo for PostgresStore {
    async fn get_job_state(&self, job_name: &str) -> MetadataResult<Option<JobStateRow>> {
        let row = sqlx::query_as::<_, JobStateRow>(
            "SELECT job_name, state, last_run_at FROM schedule_state WHERE job_name = $1",
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_job_state(&self, job_name: &str, state: &Value) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedule_state (job_name, state, last_run_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (job_name) DO UPDATE
            SET state = EXCLUDED.state, last_run_at = NOW()
            "#,
        )
        .bind(job_name)
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_job_states(&self) -> MetadataResult<Vec<JobStateRow>> {
        let rows = sqlx::query_as::<_, JobStateRow>(
            "SELECT job_name, state, last_run_at FROM schedule_state ORDER BY job_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// =============================================================================
// Posts
// =============================================================================

#[async_trait]
impl PostRepo for PostgresStore {
    async fn upsert_posts(&self, posts: &[NewPost]) -> MetadataResult<UpsertReport> {
        let mut report = UpsertReport::default();
        for post in posts {
            let result = sqlx::query(
                r#"
                INSERT INTO posts (id, raw_data, last_synced_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (id) DO UPDATE
                SET raw_data = EXCLUDED.raw_data,
                    last_synced_at = NOW(),
                    is_processed = FALSE
                "#,
            )
            .bind(post.id)
            .bind(&post.raw_data)
            .execute(&self.pool)
            .await;
            match result {
                Ok(done) => report.stored += done.rows_affected(),
                Err(sqlx::Error::Database(e)) => {
                    tracing::warn!(post_id = post.id, error = %e, "post rejected by database");
                    report.rejected.push(post.id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }

    async fn get_post(&self, id: i64) -> MetadataResult<Option<PostRow>> {
        let row = sqlx::query_as::<_, PostRow>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_unprocessed_posts(
        &self,
        after_id: i64,
        limit: i64,
    ) -> MetadataResult<Vec<PostRow>> {
        let rows = sqlx::query_as::<_, PostRow>(
            "SELECT * FROM posts WHERE is_processed = FALSE AND id > $1 ORDER BY id LIMIT $2",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn existing_post_ids(&self, ids: &[i64]) -> MetadataResult<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn set_post_liked(&self, id: i64, liked: bool) -> MetadataResult<bool> {
        let result = sqlx::query("UPDATE posts SET is_liked = $1 WHERE id = $2")
            .bind(liked)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn liked_status(&self, ids: &[i64]) -> MetadataResult<HashMap<i64, bool>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(i64, bool)> =
            sqlx::query_as("SELECT id, is_liked FROM posts WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn post_counts(&self) -> MetadataResult<PostCounts> {
        let (total, processed, liked): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE is_processed),
                   COUNT(*) FILTER (WHERE is_liked)
            FROM posts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(PostCounts {
            total,
            processed,
            liked,
        })
    }
}

// =============================================================================
// Tags
// =============================================================================

#[async_trait]
impl TagRepo for PostgresStore {
    async fn get_tags_by_ids(&self, ids: &[i64]) -> MetadataResult<Vec<TagRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, TagRow>(
            "SELECT id, name, count, type, ambiguous, last_synced_at FROM tags WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_tag(&self, tag: &RemoteTag) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (id, name, count, type, ambiguous, last_synced_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(tag.count)
        .bind(tag.tag_type)
        .bind(tag.ambiguous)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_tag(&self, tag: &RemoteTag) -> MetadataResult<()> {
        sqlx::query(
            r#"
            UPDATE tags
            SET name = $2, count = $3, type = $4, ambiguous = $5, last_synced_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(tag.count)
        .bind(tag.tag_type)
        .bind(tag.ambiguous)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_tag_names(&self, names: &[String]) -> MetadataResult<HashMap<String, i64>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, id FROM tags WHERE name = ANY($1)")
                .bind(names)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn count_tags(&self) -> MetadataResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Post tags
// =============================================================================

#[async_trait]
impl PostTagRepo for PostgresStore {
    async fn link_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> MetadataResult<()> {
        let mut tx = self.pool.begin().await?;
        for tag_id in tag_ids {
            sqlx::query(
                r#"
                INSERT INTO post_tags (post_id, tag_id, created_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (post_id, tag_id) DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE posts SET is_processed = TRUE WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_post_tag_ids(&self, post_id: i64) -> MetadataResult<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT tag_id FROM post_tags WHERE post_id = $1 ORDER BY tag_id")
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn count_post_tags(&self) -> MetadataResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_tags")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Legacy likes
// =============================================================================

#[async_trait]
impl LegacyLikeRepo for PostgresStore {
    async fn get_legacy_likes(
        &self,
        before_id: Option<i64>,
        limit: i64,
    ) -> MetadataResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM likes WHERE ($1::BIGINT IS NULL OR id < $1) ORDER BY id DESC LIMIT $2",
        )
        .bind(before_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_legacy_like(&self, id: i64) -> MetadataResult<()> {
        sqlx::query("INSERT INTO likes (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn migrate_legacy_like(&self, id: i64) -> MetadataResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE posts SET is_liked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("DELETE FROM likes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

// =============================================================================
// File sync
// =============================================================================

#[async_trait]
impl FileSyncRepo for PostgresStore {
    async fn liked_posts_without_file(&self, limit: i64) -> MetadataResult<Vec<PostRow>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT p.* FROM posts p
            WHERE p.is_liked = TRUE
              AND NOT EXISTS (
                  SELECT 1 FROM file_sync fs
                  WHERE fs.post_id = p.id AND fs.sync_status <> 'DELETED'
              )
            ORDER BY p.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn create_file_sync(&self, entry: &NewFileSync) -> MetadataResult<i64> {
        let is_deleted = entry.status == FileSyncStatus::Deleted;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO file_sync
                (post_id, download_url, expected_size, actual_size, file_ext, file_path,
                 aria_log, sync_status, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(entry.post_id)
        .bind(&entry.download_url)
        .bind(entry.expected_size)
        .bind(entry.actual_size)
        .bind(&entry.file_ext)
        .bind(&entry.file_path)
        .bind(&entry.aria_log)
        .bind(entry.status.as_str())
        .bind(is_deleted)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_file_sync_insert_error(e, entry.post_id))?;
        Ok(id)
    }

    async fn get_downloading_entries(&self) -> MetadataResult<Vec<FileSyncRow>> {
        let rows = sqlx::query_as::<_, FileSyncRow>(
            "SELECT * FROM file_sync WHERE sync_status = 'DOWNLOADING' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_file_sync_complete(&self, id: i64, actual_size: i64) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE file_sync
            SET sync_status = 'COMPLETE', actual_size = $2, updated_at = NOW()
            WHERE id = $1 AND sync_status = 'DOWNLOADING'
            "#,
        )
        .bind(id)
        .bind(actual_size)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_reclaimable_entries(&self) -> MetadataResult<Vec<FileSyncRow>> {
        let rows = sqlx::query_as::<_, FileSyncRow>(
            r#"
            SELECT fs.* FROM file_sync fs
            JOIN posts p ON p.id = fs.post_id
            WHERE fs.sync_status = 'COMPLETE'
              AND fs.is_deleted = FALSE
              AND p.is_liked = FALSE
            ORDER BY fs.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_file_sync_deleted(&self, id: i64) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE file_sync
            SET sync_status = 'DELETED', is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND sync_status = 'COMPLETE'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_file_sync_entries(&self, post_id: i64) -> MetadataResult<Vec<FileSyncRow>> {
        let rows = sqlx::query_as::<_, FileSyncRow>(
            "SELECT * FROM file_sync WHERE post_id = $1 ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn file_sync_counts(&self) -> MetadataResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sync_status, COUNT(*) FROM file_sync GROUP BY sync_status ORDER BY sync_status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
