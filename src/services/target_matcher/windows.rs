use super::processes::running_process_names;
use super::{Desktop, ProcessHandle, WindowHandle};
use crate::error::{Result, WatchError};
use crate::watch_error;
use std::ffi::{c_void, OsString};
use std::ops::ControlFlow;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use tracing::warn;
use windows::core::BOOL;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, LPARAM, MAX_PATH};
use windows::Win32::System::ProcessStatus::K32GetModuleFileNameExW;
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsWindowVisible,
};

/// Desktop backed by user32/kernel32/psapi.
#[derive(Default)]
pub struct Win32Desktop;

impl Win32Desktop {
    pub fn new() -> Self {
        Self
    }
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as usize as *mut c_void)
}

fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize as u64)
}

/// Process opened with `PROCESS_QUERY_INFORMATION | PROCESS_VM_READ`; closed on drop.
struct Win32Process {
    pid: u32,
    handle: HANDLE,
}

impl ProcessHandle for Win32Process {
    fn image_path(&self) -> Result<PathBuf> {
        let mut buffer = [0u16; MAX_PATH as usize];
        let len = unsafe { K32GetModuleFileNameExW(Some(self.handle), None, &mut buffer) };
        if len == 0 {
            return Err(WatchError::Io(std::io::Error::last_os_error()));
        }
        Ok(PathBuf::from(OsString::from_wide(&buffer[..len as usize])))
    }
}

impl Drop for Win32Process {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!(pid = self.pid, error = %e, "Failed to close process handle");
        }
    }
}

/// Hands each window to the visitor smuggled through `lparam`.
unsafe extern "system" fn enum_windows_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let visitor = &mut *(lparam.0 as *mut &mut dyn FnMut(WindowHandle) -> ControlFlow<()>);
    match visitor(handle(hwnd)) {
        ControlFlow::Continue(()) => true.into(),
        ControlFlow::Break(()) => false.into(),
    }
}

impl Desktop for Win32Desktop {
    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_invalid() {
            None
        } else {
            Some(handle(hwnd))
        }
    }

    fn window_text_length(&self, window: WindowHandle) -> Result<usize> {
        let len = unsafe { GetWindowTextLengthW(hwnd(window)) };
        Ok(len.max(0) as usize)
    }

    fn window_text(&self, window: WindowHandle, capacity: usize) -> Result<String> {
        let mut buffer = vec![0u16; capacity.max(1)];
        let copied = unsafe { GetWindowTextW(hwnd(window), &mut buffer) };
        if copied <= 0 {
            return Err(watch_error!(query, "GetWindowTextW returned nothing for {}", window));
        }
        Ok(String::from_utf16_lossy(&buffer[..copied as usize]))
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        unsafe { IsWindowVisible(hwnd(window)) }.as_bool()
    }

    fn window_process_id(&self, window: WindowHandle) -> Option<u32> {
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd(window), Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }

    fn open_process(&self, pid: u32) -> Result<Box<dyn ProcessHandle + '_>> {
        let handle = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid) }
            .map_err(|e| watch_error!(query, "OpenProcess({}) failed: {}", pid, e))?;
        Ok(Box::new(Win32Process { pid, handle }))
    }

    fn process_names(&self) -> Result<Vec<String>> {
        running_process_names()
    }

    fn enum_windows(
        &self,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut stopped = false;
        let mut tracking = |window: WindowHandle| {
            let flow = visitor(window);
            stopped = flow.is_break();
            flow
        };
        let mut visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()> = &mut tracking;
        let lparam = LPARAM(&mut visitor as *mut &mut dyn FnMut(WindowHandle) -> ControlFlow<()> as isize);

        let result = unsafe { EnumWindows(Some(enum_windows_proc), lparam) };
        match result {
            Ok(()) => Ok(()),
            // EnumWindows reports failure when the callback stops it early.
            Err(_) if stopped => Ok(()),
            Err(e) => Err(watch_error!(query, "EnumWindows failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires an interactive desktop session
    fn reads_foreground_window() {
        let desktop = Win32Desktop::new();
        if let Some(window) = desktop.foreground_window() {
            let title = crate::services::target_matcher::window_title(&desktop, window);
            println!("Foreground: {} {:?}", window, title);
        }
    }

    #[test]
    #[ignore] // Requires an interactive desktop session
    fn enumeration_stops_on_break() {
        let desktop = Win32Desktop::new();
        let mut visited = 0;
        desktop
            .enum_windows(&mut |_| {
                visited += 1;
                ControlFlow::Break(())
            })
            .expect("enumeration");
        assert!(visited <= 1);
    }
}
