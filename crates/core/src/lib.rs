//! Core domain types and shared logic for konakore.
//!
//! This crate defines the pieces every worker agrees on:
//! - Application configuration
//! - Job names and their persisted progress blobs
//! - Tag categories and remote tag records
//! - Post payload access (tag lists, download candidates)
//! - Backoff and idle-interval calculators

pub mod backoff;
pub mod config;
pub mod error;
pub mod file_sync;
pub mod job;
pub mod post;
pub mod tag;

pub use backoff::{DoublingInterval, IdleBackoff, IdleTiers};
pub use error::{Error, Result};
pub use file_sync::FileSyncStatus;
pub use job::{BackfillState, JobName, RecentState, TagSyncState};
pub use post::{DownloadChoice, PostPayload};
pub use tag::{RemoteTag, TagType};

/// Prefix shared by every file name in the local library.
pub const FILENAME_PREFIX: &str = "Konachan.com - ";

/// Posts per library subdirectory.
pub const DEFAULT_BUCKET_SIZE: i64 = 10_000;
