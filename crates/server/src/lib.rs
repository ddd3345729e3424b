//! File sync listener.
//!
//! Mirrors liked posts into the local library:
//! - adaptive, self-stopping download loop driven by `POST /trigger`
//! - completion tracking and reclamation of unliked files
//! - deep reconciliation of the library tree
//! - health and Prometheus endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod orchestrator;
pub mod reconcile;
pub mod routes;
pub mod state;

pub use error::{ApiError, SyncError, SyncResult};
pub use orchestrator::{CycleStats, DiscoveryStats, FileSync, LoopExit, LoopSettings};
pub use reconcile::{ReconcileStats, reconcile_library};
pub use routes::create_router;
pub use state::{AppState, StartOutcome, StopOutcome, SyncController};
