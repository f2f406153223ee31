//! Retention sweeper: deletes archive entries older than the retention horizon.

use crate::archive::list_archives;
use lk_core::config::LogKeeperConfig;
use lk_core::error::LkError;
use lk_core::types::ArchiveEntry;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Result of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<LkError>,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct RetentionSweeper {
    config: Arc<LogKeeperConfig>,
}

impl RetentionSweeper {
    pub fn new(config: Arc<LogKeeperConfig>) -> Self {
        Self { config }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Delete every entry whose mtime is strictly older than
    /// `now - retention_period`, rotated and compressed alike.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(horizon) = now.checked_sub(self.config.retention_period) else {
            return report;
        };

        let dir = &self.config.archive_dir;
        let entries = match list_archives(dir, self.config.archive_stem()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list archive directory");
                report.errors.push(e);
                return report;
            }
        };

        for entry in entries.into_iter().filter(|e| e.modified < horizon) {
            delete_expired(entry, &mut report).await;
        }

        debug!(
            deleted = report.deleted_count(),
            errors = report.errors.len(),
            "retention sweep finished"
        );
        report
    }
}

/// Remove one expired entry. An entry that vanished since listing counts as
/// already deleted and is neither reported as deleted nor as an error.
async fn delete_expired(entry: ArchiveEntry, report: &mut SweepReport) {
    match fs::remove_file(&entry.path).await {
        Ok(()) => {
            info!(
                archive = %entry.path.display(),
                state = ?entry.state(),
                "deleted expired archive"
            );
            report.deleted.push(entry.path);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(archive = %entry.path.display(), "archive already gone");
        }
        Err(e) => {
            warn!(
                archive = %entry.path.display(),
                error = %e,
                "failed to delete expired archive"
            );
            report.errors.push(LkError::SweepEntryDelete {
                path: entry.path,
                reason: e.to_string(),
            });
        }
    }
}
