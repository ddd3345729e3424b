//! Repository traits for metadata operations.

pub mod file_sync;
pub mod job_state;
pub mod likes;
pub mod locks;
pub mod post_tags;
pub mod posts;
pub mod tags;

pub use file_sync::FileSyncRepo;
pub use job_state::JobStateRepo;
pub use likes::LegacyLikeRepo;
pub use locks::{JobLock, LockHandle, LockRepo};
pub use post_tags::PostTagRepo;
pub use posts::PostRepo;
pub use tags::TagRepo;
