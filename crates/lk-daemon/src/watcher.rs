//! Change watcher for the active log.
//!
//! Watches the log directory non-recursively and forwards modifications of
//! the active log into a channel consumed by the coordinator.

use lk_core::config::LogKeeperConfig;
use lk_core::error::{LkError, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

/// Events emitted by the log watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The active log was written to.
    Modified(PathBuf),
    /// The watch backend reported an error.
    Error(String),
}

pub struct LogWatcher {
    log_dir: PathBuf,
    active_log_name: OsString,
    watcher: Option<RecommendedWatcher>,
}

impl LogWatcher {
    pub fn new(config: &LogKeeperConfig) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            active_log_name: OsString::from(&config.active_log_name),
            watcher: None,
        }
    }

    /// Start watching; events go to `event_tx`.
    ///
    /// A full channel drops the event: a queued one already stands for it.
    pub fn start(&mut self, event_tx: mpsc::Sender<WatchEvent>) -> Result<()> {
        if self.watcher.is_some() {
            warn!("Watcher already active, restarting...");
            self.stop();
        }

        let active_name = self.active_log_name.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let event = match result {
                    Ok(event) => match active_log_modification(&event, &active_name) {
                        Some(path) => WatchEvent::Modified(path),
                        None => return,
                    },
                    Err(e) => WatchEvent::Error(e.to_string()),
                };
                match event_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!("watch channel full, event coalesced"),
                    Err(TrySendError::Closed(_)) => trace!("watch channel closed"),
                }
            },
            Config::default(),
        )
        .map_err(|e| LkError::Watch(format!("create watcher: {e}")))?;

        watcher
            .watch(&self.log_dir, RecursiveMode::NonRecursive)
            .map_err(|e| LkError::Watch(format!("watch {}: {e}", self.log_dir.display())))?;

        self.watcher = Some(watcher);
        info!(dir = %self.log_dir.display(), file = ?self.active_log_name, "log watcher started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.log_dir) {
                debug!(error = %e, "unwatch failed");
            }
            info!("log watcher stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The active log's path if `event` is a content/metadata modification of it.
/// Renames are excluded: the rotation itself produces them.
pub fn active_log_modification(event: &Event, active_log_name: &OsStr) -> Option<PathBuf> {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) => return None,
        EventKind::Modify(_) => {}
        _ => return None,
    }
    event
        .paths
        .iter()
        .find(|path| path.file_name() == Some(active_log_name))
        .cloned()
}
