use anyhow::{Context, Result};
use clap::Parser;
use lk_core::LogKeeperConfig;
use lk_daemon::{init_logging, Coordinator, LogConfig, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Rotate, compress and expire a single growing log file.
#[derive(Debug, Parser)]
#[command(name = "logkeeper", version)]
struct Cli {
    /// Path to the TOML configuration document.
    #[arg(short, long, env = "LOGKEEPER_CONFIG", default_value = "/etc/logkeeper.toml")]
    config: PathBuf,

    /// Reconcile once (backlog, rotation check, sweep) and exit.
    #[arg(long)]
    once: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,

    /// Enable debug output.
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig {
        verbose: cli.verbose,
        format: cli.log_format,
    })?;

    let config = LogKeeperConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.check {
        println!("{}: ok", cli.config.display());
        return Ok(());
    }

    let coordinator = Coordinator::new(Arc::new(config));
    if cli.once {
        let report = coordinator.run_once().await.context("Reconciliation failed")?;
        info!(
            rotation = ?report.rotation,
            deleted = report.sweep.deleted_count(),
            sweep_errors = report.sweep.errors.len(),
            "reconciliation finished"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_stop_signal(shutdown.clone()));
    coordinator.run(shutdown).await.context("Daemon failed")?;
    Ok(())
}

async fn wait_for_stop_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler, relying on ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("received stop signal");
    shutdown.cancel();
}
