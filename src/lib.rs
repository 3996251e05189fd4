//! Event-driven detection of which registered target application is active.
//!
//! Two services do the work:
//!
//! * [`EventWatcher`] holds OS hooks for foreground and window create/destroy
//!   events and calls a handler on its own thread for every event.
//! * [`TargetMatcher`] answers "which keyword is active now" through a
//!   fallback chain: foreground window, running processes, visible windows.
//!
//! The free functions below drive one process-wide native watcher and matcher.

pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use error::{Result, WatchError};
pub use services::event_watcher::{EventWatcher, HookBackend, HookKind};
pub use services::target_matcher::{Desktop, MatchResult, MatchSource, TargetMatcher};
pub use services::TargetRegistry;

use once_cell::sync::Lazy;
use services::event_watcher::{dry_run_hooks, native_hooks};
use services::target_matcher::{native_desktop, DryRunDesktop};
use std::sync::Arc;
use std::time::Duration;

static WATCHER: Lazy<EventWatcher> = Lazy::new(|| EventWatcher::new(native_hooks()));
static MATCHER: Lazy<TargetMatcher> = Lazy::new(|| TargetMatcher::new(native_desktop()));

/// Starts the process-wide native watcher; `handler` runs once per desktop event.
///
/// Returns after both hooks are registered. Fails with
/// [`WatchError::AlreadyRunning`] if the watcher is already started.
pub fn start_watching<F>(handler: F) -> Result<()>
where
    F: FnMut() + Send + 'static,
{
    WATCHER.start(handler)
}

/// Stops the process-wide native watcher and releases its hooks. Idempotent.
pub fn stop_watching() -> Result<()> {
    WATCHER.stop()
}

/// Runs the fallback chain against the live desktop.
pub fn find_active_target(targets: &TargetRegistry) -> MatchResult {
    MATCHER.find_active_target(targets)
}

/// A hook backend and desktop that belong together.
pub struct Backends {
    pub hooks: Arc<dyn HookBackend>,
    pub desktop: Arc<dyn Desktop>,
}

/// Native backends, or an emulated desktop whose scene advances with every
/// synthetic event in dry-run mode.
pub fn create_backends(dry_run: bool, dry_run_interval: Duration) -> Backends {
    if dry_run {
        let desktop = Arc::new(DryRunDesktop::new());
        Backends {
            hooks: dry_run_hooks(dry_run_interval, desktop.clone()),
            desktop,
        }
    } else {
        Backends {
            hooks: native_hooks(),
            desktop: native_desktop(),
        }
    }
}
