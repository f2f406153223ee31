//! Daemon configuration.
//!
//! Loaded once from a TOML document and handed to every component as an
//! immutable value. Durations accept either integer seconds or a string with
//! a unit suffix (`500ms`, `5s`, `30m`, `1h`, `7d`, `2w`).

use crate::error::{LkError, Result};
use crate::naming;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_RETENTION_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_DEBOUNCE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogKeeperConfig {
    #[serde(alias = "logDir")]
    pub log_dir: PathBuf,
    #[serde(alias = "archiveDir")]
    pub archive_dir: PathBuf,
    #[serde(alias = "activeLogName")]
    pub active_log_name: String,
    #[serde(default = "default_max_size_bytes", alias = "maxSizeBytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_max_age", with = "duration_serde", alias = "maxAge")]
    pub max_age: Duration,
    #[serde(default = "default_true", alias = "compressionEnabled")]
    pub compression_enabled: bool,
    #[serde(
        default = "default_retention_period",
        with = "duration_serde",
        alias = "retentionPeriod"
    )]
    pub retention_period: Duration,
    #[serde(
        default = "default_debounce_period",
        with = "duration_serde",
        alias = "debouncePeriod"
    )]
    pub debounce_period: Duration,
    #[serde(
        default = "default_sweep_interval",
        with = "duration_serde",
        alias = "sweepInterval"
    )]
    pub sweep_interval: Duration,
    #[serde(default = "default_compression_level", alias = "compressionLevel")]
    pub compression_level: u32,
}

fn default_max_size_bytes() -> u64 {
    DEFAULT_MAX_SIZE_BYTES
}
fn default_max_age() -> Duration {
    DEFAULT_MAX_AGE
}
fn default_true() -> bool {
    true
}
fn default_retention_period() -> Duration {
    DEFAULT_RETENTION_PERIOD
}
fn default_debounce_period() -> Duration {
    DEFAULT_DEBOUNCE_PERIOD
}
fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}
fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl LogKeeperConfig {
    /// Build a configuration with every optional field at its default.
    pub fn new(
        log_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        active_log_name: impl Into<String>,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            archive_dir: archive_dir.into(),
            active_log_name: active_log_name.into(),
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            max_age: DEFAULT_MAX_AGE,
            compression_enabled: true,
            retention_period: DEFAULT_RETENTION_PERIOD,
            debounce_period: DEFAULT_DEBOUNCE_PERIOD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LkError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LkError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(LkError::ConfigInvalid("log_dir must not be empty".into()));
        }
        if self.archive_dir.as_os_str().is_empty() {
            return Err(LkError::ConfigInvalid("archive_dir must not be empty".into()));
        }
        if normalize(&self.log_dir) == normalize(&self.archive_dir) {
            return Err(LkError::ConfigInvalid(format!(
                "log_dir and archive_dir must be distinct: {}",
                self.log_dir.display()
            )));
        }
        let name = Path::new(&self.active_log_name);
        let is_bare_name = matches!(
            name.components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
        if self.active_log_name.is_empty() || !is_bare_name {
            return Err(LkError::ConfigInvalid(format!(
                "active_log_name must be a bare file name, got {:?}",
                self.active_log_name
            )));
        }
        if self.max_size_bytes == 0 {
            return Err(LkError::ConfigInvalid("max_size_bytes must be > 0".into()));
        }
        for (field, value) in [
            ("max_age", self.max_age),
            ("retention_period", self.retention_period),
            ("debounce_period", self.debounce_period),
            ("sweep_interval", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(LkError::ConfigInvalid(format!("{field} must be > 0")));
            }
        }
        if self.compression_level > 9 {
            return Err(LkError::ConfigInvalid(format!(
                "compression_level must be within 0..=9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Full path of the active log.
    pub fn active_log_path(&self) -> PathBuf {
        self.log_dir.join(&self.active_log_name)
    }

    /// Prefix used for archive entry names.
    pub fn archive_stem(&self) -> &str {
        naming::archive_stem(&self.active_log_name)
    }
}

/// Lexical normalization; the directories may not exist yet, so no canonicalize.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ========== Durations ==========

/// Parse `"90"`, `"500ms"`, `"5s"`, `"30m"`, `"1h"`, `"7d"` or `"2w"`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(LkError::ConfigInvalid(format!("invalid duration {input:?}")));
    }
    let value: u64 = digits
        .parse()
        .map_err(|e| LkError::ConfigInvalid(format!("invalid duration {input:?}: {e}")))?;
    let secs_per_unit: u64 = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => {
            return Err(LkError::ConfigInvalid(format!(
                "unknown duration unit {other:?} in {input:?}"
            )))
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| LkError::ConfigInvalid(format!("duration overflow: {input:?}")))
}

/// Render a duration with the largest unit that divides it evenly.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() != 0 {
        return format!("{}ms", duration.as_millis());
    }
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".into();
    }
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

mod duration_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
