//! Archive directory listing.

use lk_core::error::{LkError, Result};
use lk_core::naming::ArchiveName;
use lk_core::types::ArchiveEntry;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// List the archive entries of `stem` in `archive_dir`, sorted by file name.
///
/// Foreign files, directories and entries that vanish mid-listing are skipped.
pub async fn list_archives(archive_dir: &Path, stem: &str) -> Result<Vec<ArchiveEntry>> {
    let mut rd = fs::read_dir(archive_dir).await.map_err(|e| {
        LkError::Io(std::io::Error::new(
            e.kind(),
            format!("read_dir {}: {e}", archive_dir.display()),
        ))
    })?;
    let mut entries = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(name) = ArchiveName::parse(stem, &file_name) else {
            continue;
        };
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(LkError::Io(e)),
        };
        if !meta.is_file() {
            continue;
        }
        entries.push(ArchiveEntry {
            path: entry.path(),
            name,
            modified: meta.modified()?,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
