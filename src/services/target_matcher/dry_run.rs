use super::{Desktop, ProcessHandle, Scene, ScriptedDesktop, ScriptedWindow, WindowHandle};
use crate::error::Result;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Desktop emulation for dry-run mode.
///
/// Cycles through a fixed set of scenes; the dry-run event source advances it
/// before every synthetic event.
pub struct DryRunDesktop {
    scenes: Vec<ScriptedDesktop>,
    current: AtomicUsize,
}

impl Default for DryRunDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunDesktop {
    pub fn new() -> Self {
        let scenes = vec![
            Scene::new()
                .foreground(ScriptedWindow::new(0x10, "Terminal - dry_run").owned_by(100))
                .process(100, "/usr/bin/alacritty"),
            Scene::new()
                .foreground(ScriptedWindow::new(0x20, "index.html - Visual Studio Code").owned_by(200))
                .process(200, "/usr/share/code/code"),
            Scene::new()
                .foreground(ScriptedWindow::new(0x30, "New Tab").owned_by(300))
                .process(300, r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            Scene::new()
                .foreground(ScriptedWindow::new(0x40, "Files - dry_run"))
                .window(ScriptedWindow::new(0x50, "Spotify Premium")),
            Scene::new(),
        ];
        Self::with_scenes(scenes)
    }

    pub fn with_scenes(scenes: Vec<Scene>) -> Self {
        let scenes = if scenes.is_empty() {
            vec![Scene::new()]
        } else {
            scenes
        };
        Self {
            scenes: scenes.into_iter().map(ScriptedDesktop::new).collect(),
            current: AtomicUsize::new(0),
        }
    }

    /// Moves to the next scene and returns its index.
    pub fn advance(&self) -> usize {
        let len = self.scenes.len();
        let next = (self.current.fetch_add(1, Ordering::SeqCst) + 1) % len;
        info!(scene = next, "Dry-run: switching desktop scene");
        next
    }

    pub fn scene_index(&self) -> usize {
        self.current.load(Ordering::SeqCst) % self.scenes.len()
    }

    fn scene(&self) -> &ScriptedDesktop {
        &self.scenes[self.scene_index()]
    }
}

impl Desktop for DryRunDesktop {
    fn foreground_window(&self) -> Option<WindowHandle> {
        self.scene().foreground_window()
    }

    fn window_text_length(&self, window: WindowHandle) -> Result<usize> {
        self.scene().window_text_length(window)
    }

    fn window_text(&self, window: WindowHandle, capacity: usize) -> Result<String> {
        self.scene().window_text(window, capacity)
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        self.scene().is_window_visible(window)
    }

    fn window_process_id(&self, window: WindowHandle) -> Option<u32> {
        self.scene().window_process_id(window)
    }

    fn open_process(&self, pid: u32) -> Result<Box<dyn ProcessHandle + '_>> {
        self.scene().open_process(pid)
    }

    fn process_names(&self) -> Result<Vec<String>> {
        self.scene().process_names()
    }

    fn enum_windows(
        &self,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        self.scene().enum_windows(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::target_matcher::{MatchSource, TargetMatcher};
    use crate::services::TargetRegistry;
    use std::sync::Arc;

    #[test]
    fn cycles_through_scenes() {
        let desktop = Arc::new(DryRunDesktop::new());
        let matcher = TargetMatcher::new(desktop.clone());
        let targets: TargetRegistry = [("chrome", "Browser"), ("code", "Editor"), ("spotify", "Music")]
            .into_iter()
            .collect();

        assert!(!matcher.find_active_target(&targets).found);

        desktop.advance();
        let result = matcher.find_active_target(&targets);
        assert_eq!(result.keyword(), Some("code"));
        assert_eq!(result.source, Some(MatchSource::ForegroundTitle));

        desktop.advance();
        let result = matcher.find_active_target(&targets);
        assert_eq!(result.keyword(), Some("chrome"));
        assert_eq!(result.source, Some(MatchSource::ForegroundExecutable));

        desktop.advance();
        assert_eq!(matcher.find_active_target(&targets).keyword(), Some("spotify"));

        desktop.advance();
        assert!(!matcher.find_active_target(&targets).found);

        assert_eq!(desktop.advance(), 0);
    }

    #[test]
    fn empty_scene_list_still_answers() {
        let desktop = DryRunDesktop::with_scenes(Vec::new());
        assert_eq!(desktop.foreground_window(), None);
        assert_eq!(desktop.advance(), 0);
    }
}
