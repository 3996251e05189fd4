use super::r#trait::{EventHandler, HookBackend, HookKind, MessagePump, QuitSignal};
use crate::error::{Result, WatchError};
use crate::watch_error;
use std::sync::Arc;
use tracing::{trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt, CreateWindowAux,
    EventMask, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

fn intern(conn: &RustConnection, name: &str, hook: HookKind) -> Result<Atom> {
    conn.intern_atom(false, name.as_bytes())
        .map_err(|e| WatchError::hook_registration(hook, e))?
        .reply()
        .map(|reply| reply.atom)
        .map_err(|e| WatchError::hook_registration(hook, e))
}

/// Sends a private `ClientMessage` that makes the pump return.
struct ClientMessageQuit {
    conn: Arc<RustConnection>,
    window: Window,
    quit_atom: Atom,
}

impl QuitSignal for ClientMessageQuit {
    fn post_quit(&self) -> Result<()> {
        let event = ClientMessageEvent::new(32, self.window, self.quit_atom, [0u32; 5]);
        // An empty event mask delivers the event to the window's creator: the pump.
        self.conn
            .send_event(false, self.window, EventMask::NO_EVENT, event)
            .map_err(|e| watch_error!(internal, "send_event: {}", e))?;
        self.conn
            .flush()
            .map_err(|e| watch_error!(internal, "flush: {}", e))
    }
}

struct X11Pump {
    conn: Arc<RustConnection>,
    root: Window,
    quit_window: Window,
    quit_atom: Atom,
    net_active_window: Atom,
    net_client_list: Atom,
    handler: EventHandler,
}

impl X11Pump {
    fn hook_for(&self, event: &Event) -> Option<HookKind> {
        match event {
            Event::PropertyNotify(e) if e.window == self.root && e.atom == self.net_active_window => {
                Some(HookKind::Foreground)
            }
            Event::PropertyNotify(e) if e.window == self.root && e.atom == self.net_client_list => {
                Some(HookKind::ObjectLifecycle)
            }
            Event::CreateNotify(e) if e.parent == self.root => Some(HookKind::ObjectLifecycle),
            Event::DestroyNotify(e) if e.event == self.root => Some(HookKind::ObjectLifecycle),
            _ => None,
        }
    }

    fn is_quit(&self, event: &Event) -> bool {
        matches!(event, Event::ClientMessage(e) if e.window == self.quit_window && e.type_ == self.quit_atom)
    }
}

impl MessagePump for X11Pump {
    fn quit_signal(&self) -> Arc<dyn QuitSignal> {
        Arc::new(ClientMessageQuit {
            conn: self.conn.clone(),
            window: self.quit_window,
            quit_atom: self.quit_atom,
        })
    }

    fn run(&mut self) -> Result<()> {
        loop {
            let event = self
                .conn
                .wait_for_event()
                .map_err(|e| watch_error!(internal, "X11 connection lost: {}", e))?;
            if self.is_quit(&event) {
                return Ok(());
            }
            if let Some(hook) = self.hook_for(&event) {
                trace!(%hook, "X11 desktop event");
                (self.handler)();
            }
        }
    }
}

impl Drop for X11Pump {
    fn drop(&mut self) {
        let deselect = ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT);
        let released = self
            .conn
            .change_window_attributes(self.root, &deselect)
            .map_err(|e| e.to_string())
            .and_then(|cookie| cookie.check().map_err(|e| e.to_string()));
        if let Err(reason) = released {
            for hook in [HookKind::Foreground, HookKind::ObjectLifecycle] {
                let e = WatchError::hook_release(hook, &reason);
                warn!(error = %e, "Hook release failed");
            }
        }
        if let Err(e) = self.conn.destroy_window(self.quit_window) {
            warn!(error = %e, "Could not destroy quit window");
        }
        let _ = self.conn.flush();
    }
}

/// Root-window subscriptions on an EWMH desktop.
///
/// Foreground changes arrive as `_NET_ACTIVE_WINDOW` property changes; window
/// creation and destruction as `SubstructureNotify` events and
/// `_NET_CLIENT_LIST` changes.
pub struct X11Hooks;

impl HookBackend for X11Hooks {
    fn install(&self, handler: EventHandler) -> Result<Box<dyn MessagePump>> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| WatchError::hook_registration(HookKind::Foreground, e))?;
        let conn = Arc::new(conn);
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| {
                WatchError::hook_registration(HookKind::Foreground, format!("no screen {}", screen_num))
            })?;

        let net_active_window = intern(&conn, "_NET_ACTIVE_WINDOW", HookKind::Foreground)?;
        let net_client_list = intern(&conn, "_NET_CLIENT_LIST", HookKind::ObjectLifecycle)?;
        let quit_atom = intern(&conn, "_ACTIVEWATCH_QUIT", HookKind::Foreground)?;

        let quit_window = conn
            .generate_id()
            .map_err(|e| WatchError::hook_registration(HookKind::Foreground, e))?;
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            quit_window,
            root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )
        .map_err(|e| WatchError::hook_registration(HookKind::Foreground, e))?
        .check()
        .map_err(|e| WatchError::hook_registration(HookKind::Foreground, e))?;

        // From here on dropping the pump releases everything registered so far.
        let pump = X11Pump {
            conn: conn.clone(),
            root,
            quit_window,
            quit_atom,
            net_active_window,
            net_client_list,
            handler,
        };

        for (hook, mask) in [
            (HookKind::Foreground, EventMask::PROPERTY_CHANGE),
            (
                HookKind::ObjectLifecycle,
                EventMask::PROPERTY_CHANGE | EventMask::SUBSTRUCTURE_NOTIFY,
            ),
        ] {
            let select = ChangeWindowAttributesAux::new().event_mask(mask);
            conn.change_window_attributes(root, &select)
                .map_err(|e| WatchError::hook_registration(hook, e))?
                .check()
                .map_err(|e| WatchError::hook_registration(hook, e))?;
        }

        Ok(Box::new(pump))
    }
}
