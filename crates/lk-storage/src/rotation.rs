//! Rotation engine.
//!
//! Rotation is rename-then-recreate: the active log is renamed into the
//! archive directory and an empty file with the same permissions is created
//! in its place. A writer that keeps its old handle open and never reopens
//! the path keeps appending to the archived file. That is a known limitation
//! of this strategy; copy-truncate is deliberately not used.
//!
//! Thresholds are evaluated at startup and once per debounced burst of writes
//! to the active log. There is no periodic age check while running, and a
//! write refreshes the mtime the age is measured from, so `max_age` only
//! triggers at startup. A log that stops growing is not rotated by age until
//! the next restart.

use crate::archive::with_suffix;
use crate::compressor::Compressor;
use crate::probe::FileProbe;
use chrono::{Local, NaiveDateTime, Timelike};
use lk_core::config::LogKeeperConfig;
use lk_core::error::LkError;
use lk_core::naming::{ArchiveName, ArchiveState};
use lk_core::types::RotationReason;
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Rotate iff `size >= max_size_bytes` or `age >= max_age`.
pub fn should_rotate(
    size: u64,
    age: Duration,
    max_size_bytes: u64,
    max_age: Duration,
) -> Option<RotationReason> {
    if size >= max_size_bytes {
        Some(RotationReason::Size)
    } else if age >= max_age {
        Some(RotationReason::Age)
    } else {
        None
    }
}

/// A completed rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationReport {
    /// Final archive path (`.gz` when compression succeeded).
    pub archive: PathBuf,
    pub state: ArchiveState,
    pub reason: RotationReason,
    pub bytes: u64,
    /// Set when compression was attempted and failed; the entry stays rotated.
    pub compression_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RotationOutcome {
    /// No active log, or an empty one: nothing to archive.
    ActiveLogMissing,
    NotDue { size: u64, age: Duration },
    /// Another rotation holds the lock; this request was dropped.
    Busy,
    Rotated(RotationReport),
    /// The rename happened but the active log could not be recreated.
    Partial { archive: PathBuf, error: String },
    /// Nothing was moved.
    Failed { error: String },
}

impl RotationOutcome {
    pub fn is_rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated(_) | RotationOutcome::Partial { .. })
    }
}

/// State guarded by the rotation lock.
#[derive(Debug, Default)]
struct RotationState {
    /// Last archive name handed out in this process run.
    last_issued: Option<(NaiveDateTime, u32)>,
}

pub struct RotationEngine {
    config: Arc<LogKeeperConfig>,
    compressor: Option<Compressor>,
    state: Mutex<RotationState>,
}

impl RotationEngine {
    pub fn new(config: Arc<LogKeeperConfig>) -> Self {
        let compressor = config
            .compression_enabled
            .then(|| Compressor::new(config.compression_level));
        Self {
            config,
            compressor,
            state: Mutex::new(RotationState::default()),
        }
    }

    pub fn compressor(&self) -> Option<&Compressor> {
        self.compressor.as_ref()
    }

    /// Check the thresholds and rotate if either is crossed.
    ///
    /// At most one evaluation runs at a time; a concurrent caller gets
    /// [`RotationOutcome::Busy`] immediately.
    pub async fn evaluate_and_rotate(&self) -> RotationOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            debug!("rotation already in progress, dropping request");
            return RotationOutcome::Busy;
        };
        self.evaluate_locked(&mut state, SystemTime::now()).await
    }

    async fn evaluate_locked(
        &self,
        state: &mut RotationState,
        now: SystemTime,
    ) -> RotationOutcome {
        let active = self.config.active_log_path();
        let probe = match FileProbe::read(&active).await {
            Ok(probe) => probe,
            Err(LkError::ActiveLogMissing { path }) => {
                info!(path = %path.display(), "active log missing, nothing to rotate");
                return RotationOutcome::ActiveLogMissing;
            }
            Err(e) => {
                error!(path = %active.display(), error = %e, "cannot probe active log");
                return RotationOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        if probe.size == 0 {
            debug!(path = %active.display(), "active log empty, nothing to rotate");
            return RotationOutcome::ActiveLogMissing;
        }

        let age = probe.age_at(now);
        let Some(reason) = should_rotate(
            probe.size,
            age,
            self.config.max_size_bytes,
            self.config.max_age,
        ) else {
            debug!(size = probe.size, age_secs = age.as_secs(), "rotation not due");
            return RotationOutcome::NotDue {
                size: probe.size,
                age,
            };
        };

        self.rotate(state, &active, probe, reason).await
    }

    async fn rotate(
        &self,
        state: &mut RotationState,
        active: &Path,
        probe: FileProbe,
        reason: RotationReason,
    ) -> RotationOutcome {
        let now = Local::now().naive_local();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        let name = match next_archive_name(
            &self.config.archive_dir,
            self.config.archive_stem(),
            timestamp,
            state.last_issued,
        )
        .await
        {
            Ok(name) => name,
            Err(e) => {
                error!(error = %e, "cannot pick archive name");
                return RotationOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };
        let archive = self.config.archive_dir.join(name.file_name());

        if let Err(e) = fs::rename(active, &archive).await {
            let err = LkError::RotationIo(format!(
                "rename {} -> {}: {e}",
                active.display(),
                archive.display()
            ));
            error!(error = %err, "rotation aborted, active log untouched");
            return RotationOutcome::Failed {
                error: err.to_string(),
            };
        }
        state.last_issued = Some((name.timestamp, name.sequence));

        let recreated = recreate_active(active, probe.permissions.clone()).await;
        self.finish_rotation(active, archive, probe, reason, recreated).await
    }

    /// Everything after the rename: report a degraded rotation if the active
    /// log could not be recreated, otherwise compress the new entry.
    async fn finish_rotation(
        &self,
        active: &Path,
        archive: PathBuf,
        probe: FileProbe,
        reason: RotationReason,
        recreated: std::io::Result<()>,
    ) -> RotationOutcome {
        if let Err(e) = recreated {
            let err = LkError::RotationPartial(format!("recreate {}: {e}", active.display()));
            warn!(archive = %archive.display(), error = %err, "rotation degraded");
            return RotationOutcome::Partial {
                archive,
                error: err.to_string(),
            };
        }

        info!(
            archive = %archive.display(),
            reason = %reason,
            size = probe.size,
            "rotated active log"
        );

        let mut report = RotationReport {
            archive,
            state: ArchiveState::Rotated,
            reason,
            bytes: probe.size,
            compression_error: None,
        };
        if let Some(compressor) = &self.compressor {
            match compressor.compress_async(report.archive.clone()).await {
                Ok(path) => {
                    info!(archive = %path.display(), "compressed archive");
                    report.archive = path;
                    report.state = ArchiveState::Compressed;
                }
                Err(e) => {
                    warn!(
                        archive = %report.archive.display(),
                        error = %e,
                        "compression failed, keeping rotated entry"
                    );
                    report.compression_error = Some(e.to_string());
                }
            }
        }
        RotationOutcome::Rotated(report)
    }
}

/// Pick a name that exists in neither state and was not issued earlier in
/// this run.
async fn next_archive_name(
    archive_dir: &Path,
    stem: &str,
    timestamp: NaiveDateTime,
    last_issued: Option<(NaiveDateTime, u32)>,
) -> std::io::Result<ArchiveName> {
    let mut sequence = match last_issued {
        Some((ts, seq)) if ts == timestamp => seq + 1,
        _ => 0,
    };
    loop {
        let name = ArchiveName::new(stem, timestamp).with_sequence(sequence);
        let rotated = archive_dir.join(name.file_name());
        let compressed = archive_dir.join(name.compressed().file_name());
        let partial = with_suffix(&compressed, lk_core::naming::PARTIAL_SUFFIX);
        if !fs::try_exists(&rotated).await?
            && !fs::try_exists(&compressed).await?
            && !fs::try_exists(&partial).await?
        {
            return Ok(name);
        }
        sequence += 1;
    }
}

/// Create an empty active log with the captured permissions. A file that
/// reappeared in the meantime (writer reopened with create) is left as is.
async fn recreate_active(path: &Path, permissions: Permissions) -> std::io::Result<()> {
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => {
            drop(file);
            fs::set_permissions(path, permissions).await
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}
