//! Job names and the progress blobs each job persists.
//!
//! Every background job is identified by a stable name. The same name keys
//! both its advisory lock and its row in the job state table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A named background job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobName {
    /// Exhaustive page-by-page post ingestion.
    Backfill,
    /// Periodic refresh of the newest pages.
    RecentRefresh,
    /// Full tag vocabulary sync.
    TagSync,
    /// Post to tag association builder.
    PostTags,
    /// Legacy like marker migration.
    LikeMigration,
    /// Liked-file download loop.
    FileSync,
}

impl JobName {
    pub const ALL: [JobName; 6] = [
        JobName::Backfill,
        JobName::RecentRefresh,
        JobName::TagSync,
        JobName::PostTags,
        JobName::LikeMigration,
        JobName::FileSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill-all",
            Self::RecentRefresh => "sync-recent",
            Self::TagSync => "sync-tags",
            Self::PostTags => "process-post-tags",
            Self::LikeMigration => "process-likes",
            Self::FileSync => "file-sync",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| crate::Error::UnknownJob(s.to_string()))
    }
}

/// Final status recorded when backfill runs out of pages.
pub const BACKFILL_COMPLETED: &str = "completed";

/// Persisted backfill progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillState {
    pub is_active: bool,
    pub current_page: u32,
    pub interval_seconds: u64,
    #[serde(default)]
    pub final_status: Option<String>,
}

impl BackfillState {
    /// Fresh state: active, first page.
    pub fn initial(interval_seconds: u64) -> Self {
        Self {
            is_active: true,
            current_page: 1,
            interval_seconds,
            final_status: None,
        }
    }

    /// Move past a successfully ingested page.
    pub fn advance(&mut self, next_interval_seconds: u64) {
        self.current_page += 1;
        self.interval_seconds = next_interval_seconds;
    }

    /// Mark the catalog as exhausted.
    pub fn complete(&mut self) {
        self.is_active = false;
        self.final_status = Some(BACKFILL_COMPLETED.to_string());
    }

    pub fn is_completed(&self) -> bool {
        !self.is_active && self.final_status.as_deref() == Some(BACKFILL_COMPLETED)
    }
}

/// Persisted cursor for the recent-window refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentState {
    pub current_page: u32,
}

impl Default for RecentState {
    fn default() -> Self {
        Self { current_page: 1 }
    }
}

impl RecentState {
    /// Rotate to the next page, wrapping back to 1 after `window`.
    pub fn advance(&mut self, window: u32) {
        let window = window.max(1);
        self.current_page = (self.current_page % window) + 1;
    }
}

/// Persisted summary of the last tag catalog sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSyncState {
    #[serde(default)]
    pub last_sync_count: u64,
    #[serde(default)]
    pub last_sync_new: u64,
    #[serde(default)]
    pub last_sync_updated: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_completed_at: Option<OffsetDateTime>,
}

impl TagSyncState {
    /// Whether the last completed sync happened less than `period` before `now`.
    pub fn is_fresh(&self, now: OffsetDateTime, period: std::time::Duration) -> bool {
        match self.last_completed_at {
            Some(at) => {
                let age = now - at;
                age <= time::Duration::ZERO || age.unsigned_abs() < period
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_job_names_round_trip() {
        for job in JobName::ALL {
            assert_eq!(job.as_str().parse::<JobName>().unwrap(), job);
        }
        assert!("sync-everything".parse::<JobName>().is_err());
    }

    #[test]
    fn test_backfill_state_lifecycle() {
        let mut state = BackfillState::initial(10);
        assert!(state.is_active);
        assert_eq!(state.current_page, 1);

        state.advance(20);
        assert_eq!(state.current_page, 2);
        assert_eq!(state.interval_seconds, 20);
        assert!(!state.is_completed());

        state.complete();
        assert!(state.is_completed());
        assert_eq!(state.current_page, 2);
    }

    #[test]
    fn test_backfill_state_reads_blob_without_final_status() {
        let json = r#"{"is_active": true, "current_page": 17, "interval_seconds": 640}"#;
        let state: BackfillState = serde_json::from_str(json).unwrap();
        assert_eq!(state.current_page, 17);
        assert!(state.final_status.is_none());
    }

    #[test]
    fn test_recent_state_wraps_window() {
        let mut state = RecentState { current_page: 29 };
        state.advance(30);
        assert_eq!(state.current_page, 30);
        state.advance(30);
        assert_eq!(state.current_page, 1);
    }

    #[test]
    fn test_tag_sync_freshness() {
        let now = OffsetDateTime::now_utc();
        let week = std::time::Duration::from_secs(7 * 24 * 3600);

        let never = TagSyncState::default();
        assert!(!never.is_fresh(now, week));

        let recent = TagSyncState {
            last_completed_at: Some(now - Duration::days(2)),
            ..Default::default()
        };
        assert!(recent.is_fresh(now, week));

        let stale = TagSyncState {
            last_completed_at: Some(now - Duration::days(8)),
            ..Default::default()
        };
        assert!(!stale.is_fresh(now, week));
    }
}
