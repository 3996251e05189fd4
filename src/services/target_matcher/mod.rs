//! TargetMatcher service: responsibility and boundaries
//!
//! This module and its submodules answer one question: which registered keyword,
//! if any, is active on the desktop right now. They read OS state through the
//! [`Desktop`] trait and never keep anything between calls. Reacting to a match
//! belongs to the caller.

mod dry_run;
mod processes;
mod scripted;
mod target_matcher;
mod r#trait;

#[cfg(windows)]
mod windows;
#[cfg(target_os = "linux")]
mod x11;

pub use self::dry_run::DryRunDesktop;
pub use self::processes::running_process_names;
pub use self::r#trait::{native_desktop, Desktop, ProcessHandle, WindowHandle};
pub use self::scripted::{
    DesktopCall, Failures, Scene, ScriptedDesktop, ScriptedProcess, ScriptedWindow,
};
pub use self::target_matcher::{
    match_foreground, match_process_list, match_visible_windows, window_title, MatchResult,
    MatchSource, TargetMatcher,
};
