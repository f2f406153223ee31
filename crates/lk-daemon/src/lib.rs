//! logkeeper daemon: change watching, debouncing, scheduling and lifecycle.
//!
//! Filesystem events flow from the [`watcher`] into the [`coordinator`]'s
//! dispatch loop, which arms the [`debounce`] trigger; a fire runs one
//! rotation check. A separate interval drives the retention sweep.

pub mod coordinator;
pub mod debounce;
pub mod logging;
pub mod watcher;

pub use coordinator::{Coordinator, LifecycleState, StartupReport};
pub use debounce::CoalescingTrigger;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use watcher::{LogWatcher, WatchEvent};
