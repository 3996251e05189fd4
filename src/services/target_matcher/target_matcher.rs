use super::r#trait::{Desktop, WindowHandle};
use crate::services::TargetRegistry;
use crate::utils::{file_name_lower, first_keyword_in};
use crate::{debug_if_enabled, trace_if_enabled};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::debug;

/// Which strategy of the fallback chain produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchSource {
    ForegroundTitle,
    ForegroundExecutable,
    ProcessList,
    VisibleWindow,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchSource::ForegroundTitle => "foreground title",
            MatchSource::ForegroundExecutable => "foreground executable",
            MatchSource::ProcessList => "process list",
            MatchSource::VisibleWindow => "visible window",
        };
        f.write_str(name)
    }
}

/// Outcome of one matcher query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub keyword: String,
    pub found: bool,
    pub source: Option<MatchSource>,
}

impl MatchResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn found(keyword: impl Into<String>, source: MatchSource) -> Self {
        Self {
            keyword: keyword.into(),
            found: true,
            source: Some(source),
        }
    }

    /// The matched keyword, if any.
    pub fn keyword(&self) -> Option<&str> {
        self.found.then_some(self.keyword.as_str())
    }
}

/// Decides which registered keyword is active using a fixed-priority fallback chain:
/// foreground window, then running processes, then visible windows.
///
/// Holds no state between calls and may be shared across threads.
#[derive(Clone)]
pub struct TargetMatcher {
    desktop: Arc<dyn Desktop>,
}

impl TargetMatcher {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }

    pub fn desktop(&self) -> &Arc<dyn Desktop> {
        &self.desktop
    }

    pub fn find_active_target(&self, targets: &TargetRegistry) -> MatchResult {
        let keywords: Vec<&str> = targets.keywords().collect();
        self.find_active_keyword(&keywords)
    }

    /// Runs the fallback chain over lowercase `keywords`.
    pub fn find_active_keyword(&self, keywords: &[&str]) -> MatchResult {
        if keywords.iter().all(|keyword| keyword.is_empty()) {
            return MatchResult::none();
        }
        let desktop = self.desktop.as_ref();

        if let Some(result) = match_foreground(desktop, keywords) {
            return result;
        }
        if let Some(keyword) = match_process_list(desktop, keywords) {
            return MatchResult::found(keyword, MatchSource::ProcessList);
        }
        if let Some(keyword) = match_visible_windows(desktop, keywords) {
            return MatchResult::found(keyword, MatchSource::VisibleWindow);
        }

        debug_if_enabled!(keywords = keywords.len(), "No target is active");
        MatchResult::none()
    }
}

/// Title of `window`, or an empty string when it has none or the query fails.
pub fn window_title(desktop: &dyn Desktop, window: WindowHandle) -> String {
    let length = match desktop.window_text_length(window) {
        Ok(0) => return String::new(),
        Ok(length) => length,
        Err(e) => {
            trace_if_enabled!(%window, error = %e, "Title length query failed");
            return String::new();
        }
    };

    // Room for the terminator.
    match desktop.window_text(window, length + 1) {
        Ok(title) => title,
        Err(e) => {
            trace_if_enabled!(%window, error = %e, "Title query failed");
            String::new()
        }
    }
}

/// Foreground window title first, then the file name of its owning executable.
pub fn match_foreground(desktop: &dyn Desktop, keywords: &[&str]) -> Option<MatchResult> {
    let window = desktop.foreground_window()?;

    let title = window_title(desktop, window);
    if let Some(keyword) = first_keyword_in(&title, keywords) {
        debug!(%window, keyword, "Foreground title matched");
        return Some(MatchResult::found(keyword, MatchSource::ForegroundTitle));
    }

    match_foreground_executable(desktop, window, keywords)
        .map(|keyword| MatchResult::found(keyword, MatchSource::ForegroundExecutable))
}

fn match_foreground_executable<'k>(
    desktop: &dyn Desktop,
    window: WindowHandle,
    keywords: &[&'k str],
) -> Option<&'k str> {
    let pid = desktop.window_process_id(window).filter(|pid| *pid != 0)?;

    // Released when it goes out of scope, whichever way this returns.
    let process = match desktop.open_process(pid) {
        Ok(process) => process,
        Err(e) => {
            debug_if_enabled!(pid, error = %e, "Could not open foreground process");
            return None;
        }
    };

    let path = match process.image_path() {
        Ok(path) => path,
        Err(e) => {
            debug_if_enabled!(pid, error = %e, "Could not read foreground executable path");
            return None;
        }
    };

    let exe_name = file_name_lower(&path)?;
    let keyword = first_keyword_in(&exe_name, keywords)?;
    debug!(pid, exe = %exe_name, keyword, "Foreground executable matched");
    Some(keyword)
}

/// First keyword contained in any running process's executable name.
pub fn match_process_list<'k>(desktop: &dyn Desktop, keywords: &[&'k str]) -> Option<&'k str> {
    let names = match desktop.process_names() {
        Ok(names) => names,
        Err(e) => {
            debug_if_enabled!(error = %e, "Process enumeration failed");
            return None;
        }
    };

    names.iter().find_map(|name| {
        let keyword = first_keyword_in(name, keywords)?;
        debug!(process = %name, keyword, "Running process matched");
        Some(keyword)
    })
}

/// First keyword found in a visible top-level window title, in z-order.
///
/// Enumeration stops at the first matching window.
pub fn match_visible_windows<'k>(desktop: &dyn Desktop, keywords: &[&'k str]) -> Option<&'k str> {
    let mut found = None;

    let enumerated = desktop.enum_windows(&mut |window| {
        if !desktop.is_window_visible(window) {
            return ControlFlow::Continue(());
        }
        let title = window_title(desktop, window);
        match first_keyword_in(&title, keywords) {
            Some(keyword) => {
                debug!(%window, title = %title, keyword, "Visible window matched");
                found = Some(keyword);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    });

    if let Err(e) = enumerated {
        debug_if_enabled!(error = %e, "Window enumeration failed");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::target_matcher::{
        DesktopCall, Failures, Scene, ScriptedDesktop, ScriptedWindow,
    };

    fn matcher(scene: Scene) -> (TargetMatcher, Arc<ScriptedDesktop>) {
        let desktop = Arc::new(ScriptedDesktop::new(scene));
        (TargetMatcher::new(desktop.clone()), desktop)
    }

    fn registry(pairs: &[(&str, &str)]) -> TargetRegistry {
        pairs.iter().copied().collect()
    }

    fn browser_and_editor() -> TargetRegistry {
        registry(&[("chrome", "Browser"), ("code", "Editor")])
    }

    #[test]
    fn foreground_title_match() {
        let (matcher, _) = matcher(
            Scene::new().foreground(ScriptedWindow::new(1, "index.html - Visual Studio Code")),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(result, MatchResult::found("code", MatchSource::ForegroundTitle));
    }

    #[test]
    fn foreground_title_skips_lower_strategies() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "index.html - Visual Studio Code"))
                .process(10, "chrome.exe")
                .window(ScriptedWindow::new(2, "Google Chrome")),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(result.keyword(), Some("code"));
        assert!(!desktop.called(|c| *c == DesktopCall::ProcessNames));
        assert!(!desktop.called(|c| *c == DesktopCall::EnumWindows));
        assert!(!desktop.called(|c| matches!(c, DesktopCall::OpenProcess(_))));
    }

    #[test]
    fn foreground_executable_match() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "New Tab").owned_by(42))
                .process(42, r"C:\Program Files\Google\Chrome\Application\CHROME.EXE"),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(
            result,
            MatchResult::found("chrome", MatchSource::ForegroundExecutable)
        );
        assert!(!desktop.called(|c| *c == DesktopCall::ProcessNames));
        assert_eq!(desktop.open_handles(), 0);
    }

    #[test]
    fn foreground_match_wins_over_process_list() {
        let (matcher, _) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "Slack - general").owned_by(7))
                .process(7, "/usr/lib/slack/slack")
                .process(8, "/usr/bin/code"),
        );

        let targets = registry(&[("slack", "Chat"), ("code", "Editor")]);
        let result = matcher.find_active_target(&targets);
        assert_eq!(result, MatchResult::found("slack", MatchSource::ForegroundTitle));
    }

    #[test]
    fn process_list_match_without_foreground() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .process(3, "explorer.exe")
                .process(4, "chrome.exe"),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(result, MatchResult::found("chrome", MatchSource::ProcessList));
        assert!(!desktop.called(|c| *c == DesktopCall::EnumWindows));
    }

    #[test]
    fn process_list_checked_before_visible_windows() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "Terminal"))
                .window(ScriptedWindow::new(2, "Visual Studio Code"))
                .process(5, "chrome.exe"),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(result, MatchResult::found("chrome", MatchSource::ProcessList));
        assert!(!desktop.called(|c| *c == DesktopCall::EnumWindows));
    }

    #[test]
    fn visible_window_match() {
        let (matcher, _) = matcher(
            Scene::new()
                .process(1, "explorer.exe")
                .window(ScriptedWindow::new(9, "Spotify Premium")),
        );

        let targets = registry(&[("spotify", "Music")]);
        let result = matcher.find_active_target(&targets);
        assert_eq!(result, MatchResult::found("spotify", MatchSource::VisibleWindow));
    }

    #[test]
    fn visible_windows_skip_hidden_and_stop_at_first_hit() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .window(ScriptedWindow::new(1, "Hidden Spotify").hidden())
                .window(ScriptedWindow::new(2, "Notes"))
                .window(ScriptedWindow::new(3, "Discord"))
                .window(ScriptedWindow::new(4, "Spotify Premium")),
        );

        let targets = registry(&[("discord", "Chat"), ("spotify", "Music")]);
        let result = matcher.find_active_target(&targets);
        assert_eq!(result, MatchResult::found("discord", MatchSource::VisibleWindow));

        let hidden = WindowHandle(1);
        let after_hit = WindowHandle(4);
        assert!(!desktop.called(|c| *c == DesktopCall::WindowTextLength(hidden)));
        assert!(!desktop.called(|c| *c == DesktopCall::IsWindowVisible(after_hit)));
        assert!(!desktop.called(|c| *c == DesktopCall::WindowTextLength(after_hit)));
    }

    #[test]
    fn empty_keyword_set_never_matches() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "Anything"))
                .process(2, "anything.exe"),
        );

        let result = matcher.find_active_target(&TargetRegistry::new());
        assert!(!result.found);
        assert!(desktop.calls().is_empty());

        assert!(!matcher.find_active_keyword(&[""]).found);
    }

    #[test]
    fn nothing_matches() {
        let (matcher, _) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "Terminal").owned_by(2))
                .process(2, "/usr/bin/alacritty")
                .window(ScriptedWindow::new(3, "Files")),
        );

        assert_eq!(
            matcher.find_active_target(&browser_and_editor()),
            MatchResult::none()
        );
    }

    #[test]
    fn no_foreground_and_empty_desktop() {
        let (matcher, _) = matcher(Scene::new());
        assert!(!matcher.find_active_target(&browser_and_editor()).found);
    }

    #[test]
    fn failed_title_query_falls_through() {
        let (matcher, _) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "Visual Studio Code").owned_by(5))
                .process(5, "chrome.exe")
                .failing(Failures {
                    window_text: true,
                    ..Failures::default()
                }),
        );

        // The title is unreadable, the owning executable still matches.
        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(
            result,
            MatchResult::found("chrome", MatchSource::ForegroundExecutable)
        );
    }

    #[test]
    fn failed_process_open_falls_through() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "New Tab").owned_by(5))
                .process(5, "chrome.exe")
                .failing(Failures {
                    open_process: true,
                    ..Failures::default()
                }),
        );

        let result = matcher.find_active_target(&browser_and_editor());
        assert_eq!(result, MatchResult::found("chrome", MatchSource::ProcessList));
        assert_eq!(desktop.open_handles(), 0);
    }

    #[test]
    fn failed_image_path_releases_handle() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "New Tab").owned_by(5))
                .process(5, "chrome.exe")
                .failing(Failures {
                    image_path: true,
                    process_list: true,
                    ..Failures::default()
                }),
        );

        assert!(!matcher.find_active_target(&browser_and_editor()).found);
        assert!(desktop.called(|c| *c == DesktopCall::ImagePath(5)));
        assert_eq!(desktop.open_handles(), 0);
    }

    #[test]
    fn failed_process_list_falls_through_to_windows() {
        let (matcher, _) = matcher(
            Scene::new()
                .process(1, "spotify.exe")
                .window(ScriptedWindow::new(2, "Spotify Premium"))
                .failing(Failures {
                    process_list: true,
                    ..Failures::default()
                }),
        );

        let targets = registry(&[("spotify", "Music")]);
        let result = matcher.find_active_target(&targets);
        assert_eq!(result, MatchResult::found("spotify", MatchSource::VisibleWindow));
    }

    #[test]
    fn failed_window_enumeration_reports_nothing() {
        let (matcher, _) = matcher(
            Scene::new()
                .window(ScriptedWindow::new(2, "Spotify Premium"))
                .failing(Failures {
                    window_enum: true,
                    ..Failures::default()
                }),
        );

        let targets = registry(&[("spotify", "Music")]);
        assert!(!matcher.find_active_target(&targets).found);
    }

    #[test]
    fn window_title_sizes_buffer_from_length() {
        let desktop = ScriptedDesktop::new(
            Scene::new()
                .window(ScriptedWindow::new(1, "Editor"))
                .window(ScriptedWindow::new(2, "")),
        );

        assert_eq!(window_title(&desktop, WindowHandle(1)), "Editor");
        assert_eq!(
            desktop.calls(),
            vec![
                DesktopCall::WindowTextLength(WindowHandle(1)),
                DesktopCall::WindowText(WindowHandle(1)),
            ]
        );

        desktop.clear_calls();
        assert_eq!(window_title(&desktop, WindowHandle(2)), "");
        assert!(!desktop.called(|c| matches!(c, DesktopCall::WindowText(_))));

        assert_eq!(window_title(&desktop, WindowHandle(99)), "");
    }

    #[test]
    fn concurrent_queries_share_one_matcher() {
        let (matcher, desktop) = matcher(
            Scene::new()
                .foreground(ScriptedWindow::new(1, "New Tab").owned_by(5))
                .process(5, "chrome.exe"),
        );
        let targets = browser_and_editor();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let result = matcher.find_active_target(&targets);
                        assert_eq!(result.keyword(), Some("chrome"));
                    }
                });
            }
        });
        assert_eq!(desktop.open_handles(), 0);
    }
}
