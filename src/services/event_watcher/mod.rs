//! EventWatcher service: responsibility and boundaries
//!
//! This module and its submodules are responsible ONLY for noticing that the
//! foreground window or the set of windows changed, and for calling the
//! caller's handler when that happens. They do not look at what changed;
//! deciding which target is active belongs to the target matcher.

mod dry_run;
mod event_watcher;
mod r#trait;

#[cfg(not(any(windows, target_os = "linux")))]
mod unsupported;
#[cfg(windows)]
mod windows;
#[cfg(target_os = "linux")]
mod x11;

pub use self::dry_run::DryRunHooks;
pub use self::event_watcher::EventWatcher;
pub use self::r#trait::{
    dry_run_hooks, native_hooks, EventHandler, HookBackend, HookKind, MessagePump, QuitSignal,
};
