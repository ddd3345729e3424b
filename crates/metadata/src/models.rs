//! Database models mapping to the konakore schema.

use konakore_core::FileSyncStatus;
use serde_json::Value;
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Posts
// =============================================================================

/// Post record as ingested from the remote catalog.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    /// Payload exactly as the catalog returned it.
    pub raw_data: Value,
    pub is_processed: bool,
    pub is_liked: bool,
    pub last_synced_at: OffsetDateTime,
}

/// Post to upsert.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: i64,
    pub raw_data: Value,
}

impl NewPost {
    /// Build from a catalog record. Records without a numeric `id` are rejected.
    pub fn from_raw(raw: Value) -> Option<Self> {
        let id = raw.get("id").and_then(Value::as_i64)?;
        Some(Self { id, raw_data: raw })
    }
}

/// Result of a post upsert batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Rows written.
    pub stored: u64,
    /// Ids of rows the store refused. Their siblings are unaffected.
    pub rejected: Vec<i64>,
}

/// Aggregate post counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PostCounts {
    pub total: i64,
    pub processed: i64,
    pub liked: i64,
}

// =============================================================================
// Tags
// =============================================================================

/// Tag catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
    pub count: i64,
    #[sqlx(rename = "type")]
    pub tag_type: i16,
    pub ambiguous: bool,
    pub last_synced_at: OffsetDateTime,
}

// =============================================================================
// Job state
// =============================================================================

/// Persisted progress for one named job.
#[derive(Debug, Clone, FromRow)]
pub struct JobStateRow {
    pub job_name: String,
    pub state: Value,
    pub last_run_at: Option<OffsetDateTime>,
}

// =============================================================================
// File sync
// =============================================================================

/// One download attempt (or adopted file) for a post.
#[derive(Debug, Clone, FromRow)]
pub struct FileSyncRow {
    pub id: i64,
    pub post_id: i64,
    pub download_url: Option<String>,
    pub expected_size: Option<i64>,
    pub actual_size: Option<i64>,
    pub file_ext: Option<String>,
    pub file_path: String,
    /// Daemon request audit: `{gid, method, params}`.
    pub aria_log: Option<Value>,
    pub sync_status: String,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileSyncRow {
    pub fn status(&self) -> konakore_core::Result<FileSyncStatus> {
        self.sync_status.parse()
    }
}

/// File sync entry to insert.
#[derive(Debug, Clone)]
pub struct NewFileSync {
    pub post_id: i64,
    pub download_url: Option<String>,
    pub expected_size: Option<i64>,
    pub actual_size: Option<i64>,
    pub file_ext: String,
    pub file_path: String,
    pub aria_log: Option<Value>,
    pub status: FileSyncStatus,
}
