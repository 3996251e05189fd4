use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::services::target_matcher::DryRunDesktop;

/// Caller-supplied callback run once per desktop event, on the watcher thread.
pub type EventHandler = Box<dyn FnMut() + Send>;

/// The two OS subscriptions a watcher holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Foreground window changed.
    Foreground,
    /// Window object created or destroyed.
    ObjectLifecycle,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Foreground => f.write_str("foreground"),
            HookKind::ObjectLifecycle => f.write_str("create/destroy"),
        }
    }
}

/// Asks a running message pump to return. Safe to call from any thread, more than once.
pub trait QuitSignal: Send + Sync {
    fn post_quit(&self) -> Result<()>;
}

/// Registered hooks plus the loop that dispatches their events.
///
/// Lives on the thread that created it. Dropping it releases both hooks;
/// release failures are logged, never returned.
pub trait MessagePump {
    fn quit_signal(&self) -> Arc<dyn QuitSignal>;

    /// Dispatches events to the handler until a quit signal arrives.
    fn run(&mut self) -> Result<()>;
}

/// Source of desktop change notifications.
pub trait HookBackend: Send + Sync {
    /// Registers the foreground and create/destroy hooks for the calling thread.
    ///
    /// Fails with `WatchError::HookRegistration` if either hook cannot be
    /// registered; nothing stays registered in that case.
    fn install(&self, handler: EventHandler) -> Result<Box<dyn MessagePump>>;
}

/// Hook backend for the running OS.
#[cfg(windows)]
pub fn native_hooks() -> Arc<dyn HookBackend> {
    Arc::new(super::windows::WinEventHooks)
}

#[cfg(target_os = "linux")]
pub fn native_hooks() -> Arc<dyn HookBackend> {
    Arc::new(super::x11::X11Hooks)
}

#[cfg(not(any(windows, target_os = "linux")))]
pub fn native_hooks() -> Arc<dyn HookBackend> {
    Arc::new(super::unsupported::UnsupportedHooks)
}

/// Hook backend that emits a synthetic event every `interval`, moving `desktop`
/// to its next scene first.
pub fn dry_run_hooks(interval: Duration, desktop: Arc<DryRunDesktop>) -> Arc<dyn HookBackend> {
    Arc::new(super::dry_run::DryRunHooks::new(interval, desktop))
}
