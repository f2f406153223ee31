use crate::naming::{ArchiveName, ArchiveState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Why a rotation was triggered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationReason {
    /// Active log reached `max_size_bytes`.
    Size,
    /// Active log was last modified at least `max_age` ago.
    Age,
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationReason::Size => f.write_str("size"),
            RotationReason::Age => f.write_str("age"),
        }
    }
}

/// An archive file found in (or written to) the archive directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: ArchiveName,
    pub modified: SystemTime,
}

impl ArchiveEntry {
    pub fn state(&self) -> ArchiveState {
        self.name.state
    }

    pub fn is_compressed(&self) -> bool {
        self.name.state == ArchiveState::Compressed
    }
}
