//! Background ingestion workers for konakore.
//!
//! Each worker owns one job name. Long-running workers (backfill, post tag
//! association, legacy like migration) hold their job lock for their whole
//! lifetime; periodic jobs (recent refresh, tag catalog) take it per run. A
//! worker that finds its lock taken steps aside without error.

pub mod error;
pub mod jobs;
pub mod lock;
pub mod runner;

pub use error::{JobError, JobResult};
pub use jobs::backfill::{BackfillStep, BackfillWorker};
pub use jobs::likes::LikeMigration;
pub use jobs::post_tags::PostTagBuilder;
pub use jobs::recent::RecentRefresh;
pub use jobs::tags::{TagSyncSummary, TagSyncWorker, diff_tags};
pub use jobs::{BatchOutcome, IngestedPage, ingest_page};
pub use runner::{Scheduler, run_guarded};
