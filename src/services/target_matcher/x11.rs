use super::processes::running_process_names;
use super::{Desktop, ProcessHandle, WindowHandle};
use crate::error::Result;
use crate::watch_error;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConnectionExt, GetPropertyReply, MapState, Window,
};
use x11rb::rust_connection::RustConnection;

struct Atoms {
    net_active_window: Atom,
    net_client_list_stacking: Atom,
    net_wm_name: Atom,
    net_wm_pid: Atom,
}

struct Session {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
}

/// Desktop backed by an EWMH-compliant X11 window manager.
///
/// Without a display only the process list is available.
pub struct X11Desktop {
    session: Option<Session>,
}

impl Default for X11Desktop {
    fn default() -> Self {
        Self::new()
    }
}

impl X11Desktop {
    pub fn new() -> Self {
        match Self::connect() {
            Ok(session) => Self {
                session: Some(session),
            },
            Err(e) => {
                warn!(error = %e, "X11 unavailable, window strategies disabled");
                Self { session: None }
            }
        }
    }

    fn connect() -> Result<Session> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| watch_error!(query, "cannot connect to X server: {}", e))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| watch_error!(query, "screen {} does not exist", screen_num))?;

        let atoms = Atoms {
            net_active_window: intern(&conn, "_NET_ACTIVE_WINDOW")?,
            net_client_list_stacking: intern(&conn, "_NET_CLIENT_LIST_STACKING")?,
            net_wm_name: intern(&conn, "_NET_WM_NAME")?,
            net_wm_pid: intern(&conn, "_NET_WM_PID")?,
        };

        Ok(Session { conn, root, atoms })
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| watch_error!(unsupported, "no X11 display"))
    }
}

fn intern(conn: &impl Connection, name: &str) -> Result<Atom> {
    conn.intern_atom(false, name.as_bytes())
        .map_err(|e| watch_error!(query, "intern_atom({}): {}", name, e))?
        .reply()
        .map(|reply| reply.atom)
        .map_err(|e| watch_error!(query, "intern_atom({}): {}", name, e))
}

impl Session {
    fn window_property_u32(&self, window: Window, property: Atom, kind: AtomEnum) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, kind, 0, u32::MAX / 4)
            .ok()?
            .reply()
            .ok()?;
        property_u32s(&reply)
    }

    /// Title property of `window`: `_NET_WM_NAME`, falling back to `WM_NAME`.
    fn title_property(&self, window: Window) -> Result<Atom> {
        for property in [self.atoms.net_wm_name, AtomEnum::WM_NAME.into()] {
            let reply = self
                .conn
                .get_property(false, window, property, AtomEnum::ANY, 0, 0)
                .map_err(|e| watch_error!(query, "get_property: {}", e))?
                .reply()
                .map_err(|e| watch_error!(query, "get_property: {}", e))?;
            if reply.bytes_after > 0 {
                return Ok(property);
            }
        }
        Ok(self.atoms.net_wm_name)
    }

    fn title_length(&self, window: Window) -> Result<usize> {
        let property = self.title_property(window)?;
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, 0)
            .map_err(|e| watch_error!(query, "get_property: {}", e))?
            .reply()
            .map_err(|e| watch_error!(query, "get_property: {}", e))?;
        Ok(reply.bytes_after as usize)
    }

    fn title(&self, window: Window, capacity: usize) -> Result<String> {
        let property = self.title_property(window)?;
        let max_bytes = capacity.saturating_sub(1);
        let long_length = max_bytes.div_ceil(4) as u32;
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, long_length)
            .map_err(|e| watch_error!(query, "get_property: {}", e))?
            .reply()
            .map_err(|e| watch_error!(query, "get_property: {}", e))?;

        let mut bytes = reply.value;
        bytes.truncate(max_bytes);
        if bytes.is_empty() {
            return Err(watch_error!(query, "window {:#x} has no title", window));
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Client windows from the top of the stack down, falling back to the
    /// root's children when the window manager does not publish a stacking list.
    fn stacked_windows(&self) -> Result<Vec<Window>> {
        let mut windows = match self.window_property_u32(
            self.root,
            self.atoms.net_client_list_stacking,
            AtomEnum::WINDOW,
        ) {
            Some(windows) if !windows.is_empty() => windows,
            _ => {
                self.conn
                    .query_tree(self.root)
                    .map_err(|e| watch_error!(query, "query_tree: {}", e))?
                    .reply()
                    .map_err(|e| watch_error!(query, "query_tree: {}", e))?
                    .children
            }
        };
        // Both sources list bottom-most first.
        windows.reverse();
        Ok(windows)
    }
}

/// 32-bit items of a property reply; `None` for any other format.
fn property_u32s(reply: &GetPropertyReply) -> Option<Vec<u32>> {
    let values: Vec<u32> = reply.value32()?.collect();
    Some(values)
}

/// A `/proc/<pid>` directory held open for the lifetime of the handle.
struct ProcDirectory {
    pid: u32,
    _dir: File,
}

impl ProcessHandle for ProcDirectory {
    fn image_path(&self) -> Result<PathBuf> {
        Ok(std::fs::read_link(format!("/proc/{}/exe", self.pid))?)
    }
}

impl Desktop for X11Desktop {
    fn foreground_window(&self) -> Option<WindowHandle> {
        let session = self.session.as_ref()?;
        let active = session.window_property_u32(
            session.root,
            session.atoms.net_active_window,
            AtomEnum::WINDOW,
        )?;
        active
            .first()
            .copied()
            .filter(|window| *window != x11rb::NONE)
            .map(|window| WindowHandle(u64::from(window)))
    }

    fn window_text_length(&self, window: WindowHandle) -> Result<usize> {
        self.session()?.title_length(window.0 as Window)
    }

    fn window_text(&self, window: WindowHandle, capacity: usize) -> Result<String> {
        self.session()?.title(window.0 as Window, capacity)
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        session
            .conn
            .get_window_attributes(window.0 as Window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|attributes| attributes.map_state == MapState::VIEWABLE)
    }

    fn window_process_id(&self, window: WindowHandle) -> Option<u32> {
        let session = self.session.as_ref()?;
        session
            .window_property_u32(window.0 as Window, session.atoms.net_wm_pid, AtomEnum::CARDINAL)?
            .first()
            .copied()
            .filter(|pid| *pid != 0)
    }

    fn open_process(&self, pid: u32) -> Result<Box<dyn ProcessHandle + '_>> {
        let dir = File::open(format!("/proc/{}", pid))?;
        Ok(Box::new(ProcDirectory { pid, _dir: dir }))
    }

    fn process_names(&self) -> Result<Vec<String>> {
        running_process_names()
    }

    fn enum_windows(
        &self,
        visitor: &mut dyn FnMut(WindowHandle) -> ControlFlow<()>,
    ) -> Result<()> {
        for window in self.session()?.stacked_windows()? {
            if visitor(WindowHandle(u64::from(window))).is_break() {
                break;
            }
        }
        Ok(())
    }
}
