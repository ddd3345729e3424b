//! HTTP request handlers.

pub mod sync;

pub use sync::*;
