//! File sync entry lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a file sync entry.
///
/// An entry moves `Downloading -> Complete -> Deleted`, or is created
/// directly as `Complete` when the file is already on disk. A record has
/// at most one entry that is not `Deleted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileSyncStatus {
    /// Submitted to the download daemon, file not yet on disk.
    Downloading,
    /// File present in the library.
    Complete,
    /// File removed after the post was unliked.
    Deleted,
}

impl FileSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "DOWNLOADING",
            Self::Complete => "COMPLETE",
            Self::Deleted => "DELETED",
        }
    }

    /// Whether the entry still counts as the record's live entry.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

impl fmt::Display for FileSyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileSyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "DOWNLOADING" => Ok(Self::Downloading),
            "COMPLETE" => Ok(Self::Complete),
            "DELETED" => Ok(Self::Deleted),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}
