use crate::error::Result;
use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque reference to a top-level window.
///
/// Only valid for the duration of the query that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Read-only introspection handle to a running process.
///
/// The underlying OS resource is released when the handle is dropped.
pub trait ProcessHandle {
    /// Full path of the process executable.
    fn image_path(&self) -> Result<PathBuf>;
}

/// Desktop queries consumed by the matcher.
///
/// Implementations must be usable from several threads at once; every call is
/// independent and nothing acquired by one call survives it.
pub trait Desktop: Send + Sync {
    /// The window currently receiving user input, if any.
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Length of the window title in platform text units (UTF-16 units on
    /// Win32, bytes on X11); `0` when the window has no title.
    fn window_text_length(&self, window: WindowHandle) -> Result<usize>;

    /// Reads at most `capacity - 1` text units of the window title.
    fn window_text(&self, window: WindowHandle, capacity: usize) -> Result<String>;

    fn is_window_visible(&self, window: WindowHandle) -> bool;

    /// Id of the process owning `window`.
    fn window_process_id(&self, window: WindowHandle) -> Option<u32>;

    /// Opens `pid` with query-information and read-memory rights only.
    fn open_process(&self, pid: u32) -> Result<Box<dyn ProcessHandle + '_>>;

    /// Executable names of every running process.
    fn process_names(&self) -> Result<Vec<String>>;

    /// Visits top-level windows in z-order until the visitor breaks.
    fn enum_windows(
        &self,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()>;
}

/// Creates the desktop implementation for the running OS.
#[cfg(windows)]
pub fn native_desktop() -> Arc<dyn Desktop> {
    Arc::new(super::windows::Win32Desktop::new())
}

#[cfg(target_os = "linux")]
pub fn native_desktop() -> Arc<dyn Desktop> {
    Arc::new(super::x11::X11Desktop::new())
}

#[cfg(not(any(windows, target_os = "linux")))]
pub fn native_desktop() -> Arc<dyn Desktop> {
    Arc::new(super::processes::ProcessOnlyDesktop)
}
