use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LkError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Active log missing: {}", .path.display())]
    ActiveLogMissing { path: PathBuf },
    #[error("Rotation I/O failure: {0}")]
    RotationIo(String),
    #[error("Rotation partially applied: {0}")]
    RotationPartial(String),
    #[error("Compression failed: {0}")]
    CompressionFailure(String),
    #[error("Failed to delete archive entry {}: {reason}", .path.display())]
    SweepEntryDelete { path: PathBuf, reason: String },
    #[error("Watch error: {0}")]
    Watch(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LkError>;
