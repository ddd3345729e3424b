//! Outbound clients used by the konakore workers.
//!
//! - [`CatalogClient`] pages through the remote post catalog and fetches the
//!   full tag dump.
//! - [`DaemonClient`] speaks aria2's JSON-RPC over HTTP or WebSocket.
//! - [`UrlProbe`] checks that a download URL answers before it is submitted.
//! - [`TriggerClient`] drives the file-sync listener and carries the
//!   fire-and-forget like notification.

pub mod catalog;
pub mod daemon;
pub mod error;
pub mod probe;
pub mod trigger;

pub use catalog::CatalogClient;
pub use daemon::{AddUriOptions, DaemonClient, Submission, Transport};
pub use error::{RemoteError, RemoteResult};
pub use probe::UrlProbe;
pub use trigger::{HealthResponse, TriggerAction, TriggerClient, TriggerRequest, TriggerResponse};
