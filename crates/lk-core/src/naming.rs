//! Archive naming convention.
//!
//! `<stem>_<YYYYMMDD_HHMMSS>[_<n>].log` for rotated entries, with `.gz`
//! appended once compressed. This is the only on-disk contract other tooling
//! may depend on.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const ARCHIVE_EXTENSION: &str = ".log";
pub const COMPRESSED_SUFFIX: &str = ".gz";
/// Suffix of an in-flight compression output.
pub const PARTIAL_SUFFIX: &str = ".partial";

static ARCHIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<stem>.+)_(?P<ts>\d{8}_\d{6})(?:_(?P<seq>\d+))?\.log(?P<gz>\.gz)?$")
        .expect("archive name pattern is valid")
});

/// State of an archive entry on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveState {
    /// Plain renamed copy of the old active log.
    Rotated,
    /// Compressed artifact; the rotated original is gone.
    Compressed,
}

/// Strip the final extension of the active log name: `app.log` -> `app`.
pub fn archive_stem(active_log_name: &str) -> &str {
    match active_log_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => active_log_name,
    }
}

/// Parsed archive file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub stem: String,
    pub timestamp: NaiveDateTime,
    /// Collision disambiguator; 0 means none.
    pub sequence: u32,
    pub state: ArchiveState,
}

impl ArchiveName {
    pub fn new(stem: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            stem: stem.into(),
            timestamp,
            sequence: 0,
            state: ArchiveState::Rotated,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// The same entry in compressed state.
    pub fn compressed(&self) -> Self {
        Self {
            state: ArchiveState::Compressed,
            ..self.clone()
        }
    }

    /// The same entry in rotated state.
    pub fn rotated(&self) -> Self {
        Self {
            state: ArchiveState::Rotated,
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        let mut name = format!("{}_{}", self.stem, self.timestamp.format(TIMESTAMP_FORMAT));
        if self.sequence > 0 {
            name.push_str(&format!("_{}", self.sequence));
        }
        name.push_str(ARCHIVE_EXTENSION);
        if self.state == ArchiveState::Compressed {
            name.push_str(COMPRESSED_SUFFIX);
        }
        name
    }

    /// Parse a file name belonging to `stem`. Foreign files yield `None`.
    pub fn parse(stem: &str, file_name: &str) -> Option<Self> {
        let caps = ARCHIVE_RE.captures(file_name)?;
        if &caps["stem"] != stem {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(&caps["ts"], TIMESTAMP_FORMAT).ok()?;
        let sequence = match caps.name("seq") {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let state = if caps.name("gz").is_some() {
            ArchiveState::Compressed
        } else {
            ArchiveState::Rotated
        };
        Some(Self {
            stem: stem.to_string(),
            timestamp,
            sequence,
            state,
        })
    }
}
