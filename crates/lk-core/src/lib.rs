//! Shared building blocks for logkeeper: configuration, error taxonomy and
//! the archive naming convention.

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::LogKeeperConfig;
pub use error::{LkError, Result};
pub use naming::{ArchiveName, ArchiveState};
pub use types::{ArchiveEntry, RotationReason};
