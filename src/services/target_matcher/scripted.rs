//! In-memory desktop driven by a [`Scene`].
//!
//! Used by dry-run mode and by tests. Every query is recorded as a
//! [`DesktopCall`] and open process handles are counted, so callers can check
//! which strategies ran and that nothing leaked.

use super::{Desktop, ProcessHandle, WindowHandle};
use crate::error::Result;
use crate::watch_error;
use parking_lot::{Mutex, RwLock};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedWindow {
    pub handle: WindowHandle,
    pub title: String,
    pub visible: bool,
    pub pid: Option<u32>,
}

impl ScriptedWindow {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            handle: WindowHandle(id),
            title: title.into(),
            visible: true,
            pid: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn owned_by(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedProcess {
    pub pid: u32,
    pub exe_path: PathBuf,
}

/// Query failures to inject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Failures {
    pub window_text: bool,
    pub open_process: bool,
    pub image_path: bool,
    pub process_list: bool,
    pub window_enum: bool,
}

/// Snapshot of desktop state. Windows are listed in z-order, topmost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scene {
    pub foreground: Option<WindowHandle>,
    pub windows: Vec<ScriptedWindow>,
    pub processes: Vec<ScriptedProcess>,
    pub failures: Failures,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, window: ScriptedWindow) -> Self {
        self.windows.push(window);
        self
    }

    /// Adds `window` and makes it the foreground window.
    pub fn foreground(mut self, window: ScriptedWindow) -> Self {
        self.foreground = Some(window.handle);
        self.windows.insert(0, window);
        self
    }

    pub fn process(mut self, pid: u32, exe_path: impl Into<PathBuf>) -> Self {
        self.processes.push(ScriptedProcess {
            pid,
            exe_path: exe_path.into(),
        });
        self
    }

    pub fn failing(mut self, failures: Failures) -> Self {
        self.failures = failures;
        self
    }
}

/// One recorded desktop query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopCall {
    ForegroundWindow,
    WindowTextLength(WindowHandle),
    WindowText(WindowHandle),
    IsWindowVisible(WindowHandle),
    WindowProcessId(WindowHandle),
    OpenProcess(u32),
    ImagePath(u32),
    ProcessNames,
    EnumWindows,
}

#[derive(Debug, Default)]
pub struct ScriptedDesktop {
    scene: RwLock<Scene>,
    calls: Mutex<Vec<DesktopCall>>,
    open_handles: AtomicUsize,
}

impl ScriptedDesktop {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: RwLock::new(scene),
            calls: Mutex::new(Vec::new()),
            open_handles: AtomicUsize::new(0),
        }
    }

    pub fn set_scene(&self, scene: Scene) {
        *self.scene.write() = scene;
    }

    /// Recorded queries, oldest first.
    pub fn calls(&self) -> Vec<DesktopCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn called(&self, predicate: impl Fn(&DesktopCall) -> bool) -> bool {
        self.calls.lock().iter().any(predicate)
    }

    /// Process handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    fn record(&self, call: DesktopCall) {
        self.calls.lock().push(call);
    }

    fn find_window(&self, window: WindowHandle) -> Option<ScriptedWindow> {
        self.scene
            .read()
            .windows
            .iter()
            .find(|w| w.handle == window)
            .cloned()
    }
}

struct ScriptedProcessHandle<'a> {
    desktop: &'a ScriptedDesktop,
    pid: u32,
    exe_path: PathBuf,
}

impl ProcessHandle for ScriptedProcessHandle<'_> {
    fn image_path(&self) -> Result<PathBuf> {
        self.desktop.record(DesktopCall::ImagePath(self.pid));
        if self.desktop.scene.read().failures.image_path {
            return Err(watch_error!(query, "image path of {} unavailable", self.pid));
        }
        Ok(self.exe_path.clone())
    }
}

impl Drop for ScriptedProcessHandle<'_> {
    fn drop(&mut self) {
        self.desktop.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Desktop for ScriptedDesktop {
    fn foreground_window(&self) -> Option<WindowHandle> {
        self.record(DesktopCall::ForegroundWindow);
        self.scene.read().foreground
    }

    fn window_text_length(&self, window: WindowHandle) -> Result<usize> {
        self.record(DesktopCall::WindowTextLength(window));
        if self.scene.read().failures.window_text {
            return Err(watch_error!(query, "title length of {} unavailable", window));
        }
        self.find_window(window)
            .map(|w| w.title.chars().count())
            .ok_or_else(|| watch_error!(query, "no window {}", window))
    }

    fn window_text(&self, window: WindowHandle, capacity: usize) -> Result<String> {
        self.record(DesktopCall::WindowText(window));
        if self.scene.read().failures.window_text {
            return Err(watch_error!(query, "title of {} unavailable", window));
        }
        let title = self
            .find_window(window)
            .map(|w| w.title)
            .ok_or_else(|| watch_error!(query, "no window {}", window))?;
        Ok(title.chars().take(capacity.saturating_sub(1)).collect())
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        self.record(DesktopCall::IsWindowVisible(window));
        self.find_window(window).is_some_and(|w| w.visible)
    }

    fn window_process_id(&self, window: WindowHandle) -> Option<u32> {
        self.record(DesktopCall::WindowProcessId(window));
        self.find_window(window).and_then(|w| w.pid)
    }

    fn open_process(&self, pid: u32) -> Result<Box<dyn ProcessHandle + '_>> {
        self.record(DesktopCall::OpenProcess(pid));
        let scene = self.scene.read();
        if scene.failures.open_process {
            return Err(watch_error!(query, "access to process {} denied", pid));
        }
        let process = scene
            .processes
            .iter()
            .find(|p| p.pid == pid)
            .ok_or_else(|| watch_error!(query, "no process {}", pid))?;

        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedProcessHandle {
            desktop: self,
            pid,
            exe_path: process.exe_path.clone(),
        }))
    }

    fn process_names(&self) -> Result<Vec<String>> {
        self.record(DesktopCall::ProcessNames);
        let scene = self.scene.read();
        if scene.failures.process_list {
            return Err(watch_error!(query, "process snapshot failed"));
        }
        Ok(scene
            .processes
            .iter()
            .filter_map(|p| {
                let path = p.exe_path.to_string_lossy();
                path.rsplit(['/', '\\']).next().map(str::to_owned)
            })
            .collect())
    }

    fn enum_windows(
        &self,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        self.record(DesktopCall::EnumWindows);
        let handles: Vec<WindowHandle> = {
            let scene = self.scene.read();
            if scene.failures.window_enum {
                return Err(watch_error!(query, "window enumeration failed"));
            }
            scene.windows.iter().map(|w| w.handle).collect()
        };
        // The scene lock is released so the visitor can query this desktop.
        for handle in handles {
            if visitor(handle).is_break() {
                break;
            }
        }
        Ok(())
    }
}
