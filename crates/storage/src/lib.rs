//! Local image library for konakore.
//!
//! Downloaded files live under a root directory split into buckets of
//! consecutive post ids. File names start with a fixed prefix followed by the
//! post id, which is how files are matched back to posts.

pub mod error;
pub mod library;
pub mod naming;

pub use error::{StorageError, StorageResult};
pub use library::{Library, LibraryFile};
