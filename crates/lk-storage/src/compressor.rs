//! Gzip compressor for rotated archive entries.
//!
//! Output goes to `<entry>.gz.partial` first and is renamed into place only
//! after the gzip trailer is written and the file is synced. The rotated
//! original is deleted last.

use crate::archive::{list_archives, with_suffix};
use flate2::write::GzEncoder;
use flate2::Compression;
use lk_core::error::{LkError, Result};
use lk_core::naming::{ArchiveName, ArchiveState, COMPRESSED_SUFFIX, PARTIAL_SUFFIX};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

/// What the startup backlog pass did.
#[derive(Debug, Default)]
pub struct BacklogReport {
    pub partials_removed: usize,
    pub compressed: Vec<PathBuf>,
    pub errors: Vec<LkError>,
}

impl Compressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// Compress `path` into `path.gz` and remove `path`.
    ///
    /// On failure the original is left untouched and no output remains.
    pub fn compress(&self, path: &Path) -> Result<PathBuf> {
        if path.to_string_lossy().ends_with(COMPRESSED_SUFFIX) {
            return Err(LkError::CompressionFailure(format!(
                "{} is already compressed",
                path.display()
            )));
        }
        let target = with_suffix(path, COMPRESSED_SUFFIX);
        let partial = with_suffix(&target, PARTIAL_SUFFIX);

        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| LkError::CompressionFailure(format!("stat {}: {e}", path.display())))?;

        if let Err(e) = self.write_gzip(path, &partial) {
            let _ = fs::remove_file(&partial);
            return Err(LkError::CompressionFailure(format!(
                "compress {}: {e}",
                path.display()
            )));
        }
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(LkError::CompressionFailure(format!(
                "rename {} -> {}: {e}",
                partial.display(),
                target.display()
            )));
        }
        let mtime = filetime::FileTime::from_system_time(modified);
        if let Err(e) = filetime::set_file_mtime(&target, mtime) {
            warn!(
                archive = %target.display(),
                error = %e,
                "failed to carry mtime onto compressed archive"
            );
        }
        if let Err(e) = fs::remove_file(path) {
            // Both states on disk would break the one-entry-per-rotation contract.
            let _ = fs::remove_file(&target);
            return Err(LkError::CompressionFailure(format!(
                "remove original {}: {e}",
                path.display()
            )));
        }
        debug!(archive = %target.display(), "compressed archive entry");
        Ok(target)
    }

    /// Run [`Compressor::compress`] on the blocking pool.
    pub async fn compress_async(&self, path: PathBuf) -> Result<PathBuf> {
        let compressor = *self;
        tokio::task::spawn_blocking(move || compressor.compress(&path))
            .await
            .map_err(|e| LkError::CompressionFailure(format!("compression task failed: {e}")))?
    }

    fn write_gzip(&self, source: &Path, partial: &Path) -> io::Result<()> {
        let mut input = BufReader::new(File::open(source)?);
        let output = File::create(partial)?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), self.level);
        io::copy(&mut input, &mut encoder)?;
        let writer = encoder.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    /// Finish work a previous run left behind in `archive_dir`.
    ///
    /// Removes orphaned `.partial` outputs and compresses entries still in
    /// rotated state. An entry whose `.gz` already exists is a completed
    /// compression that crashed before deleting the original.
    pub async fn recover_backlog(&self, archive_dir: &Path, stem: &str) -> Result<BacklogReport> {
        let mut report = BacklogReport::default();

        let mut rd = tokio::fs::read_dir(archive_dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(base) = file_name.strip_suffix(PARTIAL_SUFFIX) else {
                continue;
            };
            if ArchiveName::parse(stem, base).is_none() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "removed partial compression output");
                    report.partials_removed += 1;
                }
                Err(e) => report.errors.push(LkError::CompressionFailure(format!(
                    "remove partial {}: {e}",
                    entry.path().display()
                ))),
            }
        }

        for entry in list_archives(archive_dir, stem).await? {
            if entry.state() != ArchiveState::Rotated {
                continue;
            }
            let compressed = with_suffix(&entry.path, COMPRESSED_SUFFIX);
            if tokio::fs::try_exists(&compressed).await.unwrap_or(false) {
                if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                    report.errors.push(LkError::CompressionFailure(format!(
                        "remove original {}: {e}",
                        entry.path.display()
                    )));
                }
                continue;
            }
            match self.compress_async(entry.path.clone()).await {
                Ok(path) => report.compressed.push(path),
                Err(e) => {
                    warn!(
                        archive = %entry.path.display(),
                        error = %e,
                        "backlog compression failed"
                    );
                    report.errors.push(e);
                }
            }
        }

        if report.partials_removed > 0 || !report.compressed.is_empty() {
            info!(
                partials_removed = report.partials_removed,
                compressed = report.compressed.len(),
                "recovered compression backlog"
            );
        }
        Ok(report)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(lk_core::config::DEFAULT_COMPRESSION_LEVEL)
    }
}
