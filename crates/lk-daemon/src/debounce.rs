//! Coalescing trigger.
//!
//! Every [`CoalescingTrigger::arm`] replaces the pending timer, so a burst of
//! requests yields exactly one fire, `period` after the last request.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Default)]
struct TriggerState {
    pending: Option<JoinHandle<()>>,
    generation: u64,
    closed: bool,
}

pub struct CoalescingTrigger {
    period: Duration,
    state: Arc<Mutex<TriggerState>>,
    fire_tx: mpsc::Sender<()>,
}

impl CoalescingTrigger {
    /// Create a trigger and the receiver its fires are delivered to.
    pub fn new(period: Duration) -> (Self, mpsc::Receiver<()>) {
        let (fire_tx, fire_rx) = mpsc::channel(1);
        let trigger = Self {
            period,
            state: Arc::new(Mutex::new(TriggerState::default())),
            fire_tx,
        };
        (trigger, fire_rx)
    }

    /// (Re)arm the timer. Returns `false` once the trigger is cancelled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }

        let shared = Arc::clone(&self.state);
        let fire_tx = self.fire_tx.clone();
        let period = self.period;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(period).await;
            // Re-checked under the lock: a newer arm or a cancel wins.
            let mut state = shared.lock();
            if state.closed || state.generation != generation {
                return;
            }
            state.pending = None;
            if fire_tx.try_send(()).is_err() {
                trace!("fire already queued");
            }
        }));
        true
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Abort the pending timer and refuse further arms. No fire is delivered
    /// after this returns.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for CoalescingTrigger {
    fn drop(&mut self) {
        self.cancel();
    }
}
