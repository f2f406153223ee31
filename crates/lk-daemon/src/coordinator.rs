//! Coordinator: owns the timers, dispatches work and drives the lifecycle
//! `Starting -> Running -> Stopping -> Stopped`.

use crate::debounce::CoalescingTrigger;
use crate::watcher::{LogWatcher, WatchEvent};
use lk_core::config::LogKeeperConfig;
use lk_core::error::{LkError, Result};
use lk_storage::{BacklogReport, RetentionSweeper, RotationEngine, RotationOutcome, SweepReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const WATCH_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// What the startup reconciliation did.
#[derive(Debug)]
pub struct StartupReport {
    pub backlog: Option<BacklogReport>,
    pub rotation: RotationOutcome,
    pub sweep: SweepReport,
}

pub struct Coordinator {
    config: Arc<LogKeeperConfig>,
    engine: Arc<RotationEngine>,
    sweeper: Arc<RetentionSweeper>,
    state_tx: watch::Sender<LifecycleState>,
}

impl Coordinator {
    pub fn new(config: Arc<LogKeeperConfig>) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::Starting);
        Self {
            engine: Arc::new(RotationEngine::new(config.clone())),
            sweeper: Arc::new(RetentionSweeper::new(config.clone())),
            config,
            state_tx,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        debug!(?state, "lifecycle transition");
        self.state_tx.send_replace(state);
    }

    /// Startup reconciliation only: backlog, one rotation check, one sweep.
    pub async fn run_once(&self) -> Result<StartupReport> {
        self.set_state(LifecycleState::Starting);
        let result = self.start().await;
        self.set_state(LifecycleState::Stopped);
        result
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Returns an error only when startup fails (archive directory cannot be
    /// created, watcher cannot start).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.set_state(LifecycleState::Starting);
        if let Err(e) = self.start().await {
            self.set_state(LifecycleState::Stopped);
            return Err(e);
        }

        let (event_tx, mut event_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut watcher = LogWatcher::new(&self.config);
        if let Err(e) = watcher.start(event_tx) {
            error!(error = %e, "cannot start log watcher");
            self.set_state(LifecycleState::Stopped);
            return Err(e);
        }
        let (trigger, mut fire_rx) = CoalescingTrigger::new(self.config.debounce_period);
        let period = self.config.sweep_interval;
        let mut sweep_timer = interval_at(Instant::now() + period, period);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let sweep_running = Arc::new(AtomicBool::new(false));
        let mut tasks: JoinSet<()> = JoinSet::new();

        self.set_state(LifecycleState::Running);
        info!(
            active_log = %self.config.active_log_path().display(),
            archive_dir = %self.config.archive_dir.display(),
            "logkeeper running"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                Some(event) = event_rx.recv() => match event {
                    WatchEvent::Modified(path) => {
                        trace!(path = %path.display(), "active log modified");
                        trigger.arm();
                    }
                    WatchEvent::Error(e) => warn!(error = %e, "watch backend error"),
                },
                Some(()) = fire_rx.recv() => {
                    let engine = Arc::clone(&self.engine);
                    tasks.spawn(async move {
                        let outcome = engine.evaluate_and_rotate().await;
                        debug!(?outcome, "debounced rotation check finished");
                    });
                }
                _ = sweep_timer.tick() => {
                    if sweep_running.swap(true, Ordering::SeqCst) {
                        debug!("previous sweep still running, skipping tick");
                    } else {
                        let sweeper = Arc::clone(&self.sweeper);
                        let running = Arc::clone(&sweep_running);
                        tasks.spawn(async move {
                            log_sweep(&sweeper.sweep().await);
                            running.store(false, Ordering::SeqCst);
                        });
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "background task failed");
                    }
                }
            }
        }

        self.set_state(LifecycleState::Stopping);
        watcher.stop();
        trigger.cancel();
        drop(sweep_timer);
        event_rx.close();
        while event_rx.try_recv().is_ok() {}
        fire_rx.close();
        while fire_rx.try_recv().is_ok() {}
        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(in_flight, "waiting for in-flight work");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "background task failed");
            }
        }

        self.set_state(LifecycleState::Stopped);
        info!("logkeeper stopped");
        Ok(())
    }

    async fn start(&self) -> Result<StartupReport> {
        let (log_dir, archive_dir) = (&self.config.log_dir, &self.config.archive_dir);
        tokio::fs::create_dir_all(log_dir)
            .await
            .map_err(|e| LkError::Io(io_context(e, "create log_dir", log_dir)))?;
        tokio::fs::create_dir_all(archive_dir)
            .await
            .map_err(|e| LkError::Io(io_context(e, "create archive_dir", archive_dir)))?;
        warn_if_cross_device(&self.config);

        let backlog = match self.engine.compressor() {
            Some(compressor) => {
                match compressor
                    .recover_backlog(&self.config.archive_dir, self.config.archive_stem())
                    .await
                {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(error = %e, "compression backlog recovery failed");
                        None
                    }
                }
            }
            None => None,
        };

        let rotation = self.engine.evaluate_and_rotate().await;
        debug!(outcome = ?rotation, "startup rotation check finished");
        let sweep = self.sweeper.sweep().await;
        log_sweep(&sweep);

        Ok(StartupReport {
            backlog,
            rotation,
            sweep,
        })
    }
}

fn log_sweep(report: &SweepReport) {
    if report.deleted_count() > 0 || !report.is_clean() {
        info!(
            deleted = report.deleted_count(),
            errors = report.errors.len(),
            "retention sweep finished"
        );
    }
}

fn io_context(e: std::io::Error, op: &str, path: &std::path::Path) -> std::io::Error {
    std::io::Error::new(e.kind(), format!("{op} {}: {e}", path.display()))
}

#[cfg(unix)]
fn warn_if_cross_device(config: &LogKeeperConfig) {
    use std::os::unix::fs::MetadataExt;
    if let (Ok(logs), Ok(archive)) = (
        std::fs::metadata(&config.log_dir),
        std::fs::metadata(&config.archive_dir),
    ) {
        if logs.dev() != archive.dev() {
            warn!(
                log_dir = %config.log_dir.display(),
                archive_dir = %config.archive_dir.display(),
                "log_dir and archive_dir are on different filesystems; rotations will fail"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_cross_device(_config: &LogKeeperConfig) {}
