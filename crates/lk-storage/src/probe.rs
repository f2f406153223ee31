//! Size/mtime probe for the active log.

use lk_core::error::{LkError, Result};
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;

/// Snapshot of the active log's metadata.
#[derive(Debug, Clone)]
pub struct FileProbe {
    pub size: u64,
    pub modified: SystemTime,
    pub permissions: Permissions,
}

impl FileProbe {
    /// Read metadata; a missing file maps to [`LkError::ActiveLogMissing`].
    pub async fn read(path: &Path) -> Result<Self> {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LkError::ActiveLogMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(LkError::Io(e)),
        };
        if !meta.is_file() {
            return Err(LkError::RotationIo(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            size: meta.len(),
            modified: meta.modified()?,
            permissions: meta.permissions(),
        })
    }

    pub fn age_at(&self, now: SystemTime) -> Duration {
        age_between(self.modified, now)
    }
}

/// `now - then`, clamped to zero when `then` lies in the future.
pub fn age_between(then: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(then).unwrap_or(Duration::ZERO)
}
