use crate::error::Result;
use crate::watch_error;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

/// Executable names of every running process, as reported by the OS.
pub fn running_process_names() -> Result<Vec<String>> {
    let mut sys = System::new();
    let refreshed = sys.refresh_processes(ProcessesToUpdate::All, true);
    debug!(refreshed, "Enumerated running processes");

    if sys.processes().is_empty() {
        return Err(watch_error!(query, "process table is empty"));
    }

    Ok(sys
        .processes()
        .values()
        .map(|process| process.name().to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .collect())
}

/// Desktop for hosts without a window system backend: only the process list works.
#[cfg(not(any(windows, target_os = "linux")))]
pub struct ProcessOnlyDesktop;

#[cfg(not(any(windows, target_os = "linux")))]
impl super::Desktop for ProcessOnlyDesktop {
    fn foreground_window(&self) -> Option<super::WindowHandle> {
        None
    }

    fn window_text_length(&self, _window: super::WindowHandle) -> Result<usize> {
        Err(watch_error!(unsupported, "window titles"))
    }

    fn window_text(&self, _window: super::WindowHandle, _capacity: usize) -> Result<String> {
        Err(watch_error!(unsupported, "window titles"))
    }

    fn is_window_visible(&self, _window: super::WindowHandle) -> bool {
        false
    }

    fn window_process_id(&self, _window: super::WindowHandle) -> Option<u32> {
        None
    }

    fn open_process(&self, pid: u32) -> Result<Box<dyn super::ProcessHandle + '_>> {
        Err(watch_error!(unsupported, "opening process {}", pid))
    }

    fn process_names(&self) -> Result<Vec<String>> {
        running_process_names()
    }

    fn enum_windows(
        &self,
        _visitor: &mut dyn FnMut(super::WindowHandle) -> std::ops::ControlFlow<()>,
    ) -> Result<()> {
        Err(watch_error!(unsupported, "window enumeration"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_at_least_the_test_process() {
        let names = running_process_names().expect("process enumeration");
        assert!(!names.is_empty());
        assert!(names.iter().all(|name| !name.is_empty()));
    }
}
