//! Diagnostic logging setup for the daemon's own output.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILTER: &str = "logkeeper=info,lk_core=info,lk_storage=info,lk_daemon=info";
const VERBOSE_LOG_FILTER: &str = "logkeeper=debug,lk_core=debug,lk_storage=debug,lk_daemon=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration for the daemon binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    pub verbose: bool,
    pub format: LogFormat,
}

/// Build the filter: `--verbose` wins, then `RUST_LOG`, then the default.
pub fn build_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Initialize tracing with a stderr writer.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let filter = build_filter(config.verbose);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter() {
        let filter = build_filter(true);
        assert!(filter.to_string().contains("lk_storage=debug"));
    }

    #[test]
    fn test_default_format_is_text() {
        assert_eq!(LogConfig::default().format, LogFormat::Text);
    }
}
