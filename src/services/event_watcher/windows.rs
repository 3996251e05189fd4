use super::r#trait::{EventHandler, HookBackend, HookKind, MessagePump, QuitSignal};
use crate::error::{Result, WatchError};
use crate::watch_error;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace, warn};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage,
    EVENT_OBJECT_CREATE, EVENT_OBJECT_DESTROY, EVENT_SYSTEM_FOREGROUND, MSG, PM_NOREMOVE,
    WINEVENT_OUTOFCONTEXT, WM_QUIT, WM_USER,
};

thread_local! {
    // Out-of-context WinEvents are delivered on the thread that registered them.
    static HANDLER: RefCell<Option<EventHandler>> = const { RefCell::new(None) };
}

unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    _hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _id_event_thread: u32,
    _dwms_event_time: u32,
) {
    trace!(event = format_args!("{:#06x}", event), "WinEvent");
    HANDLER.with(|slot| {
        // A handler that pumps messages itself must not re-enter.
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if let Some(handler) = slot.as_mut() {
                dispatch(handler);
            }
        }
    });
}

/// Runs the handler, containing a panic so it cannot unwind into user32.
///
/// Returns `false` if the handler panicked.
fn dispatch(handler: &mut EventHandler) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| handler())) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(panic = %message, "Event handler panicked, event dropped");
            false
        }
    }
}

/// One registered WinEvent hook, unhooked on drop.
struct WinEventHook {
    kind: HookKind,
    handle: HWINEVENTHOOK,
}

impl WinEventHook {
    fn register(kind: HookKind, event_min: u32, event_max: u32) -> Result<Self> {
        let handle = unsafe {
            SetWinEventHook(
                event_min,
                event_max,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT,
            )
        };
        if handle.is_invalid() {
            return Err(WatchError::hook_registration(
                kind,
                std::io::Error::last_os_error(),
            ));
        }
        Ok(Self { kind, handle })
    }
}

impl Drop for WinEventHook {
    fn drop(&mut self) {
        if !unsafe { UnhookWinEvent(self.handle) }.as_bool() {
            let e = WatchError::hook_release(self.kind, std::io::Error::last_os_error());
            warn!(error = %e, "Hook release failed");
        }
    }
}

/// Posts `WM_QUIT` to the pump thread's queue.
struct ThreadQuit {
    thread_id: u32,
}

impl QuitSignal for ThreadQuit {
    fn post_quit(&self) -> Result<()> {
        unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
            .map_err(|e| watch_error!(internal, "PostThreadMessageW failed: {}", e))
    }
}

struct WinEventPump {
    quit: Arc<ThreadQuit>,
    // Field order is drop order: hooks go before the handler.
    _hooks: [WinEventHook; 2],
    _handler: HandlerSlot,
}

/// Clears the thread-local handler on drop.
struct HandlerSlot;

impl Drop for HandlerSlot {
    fn drop(&mut self) {
        HANDLER.with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                slot.take();
            }
        });
    }
}

impl MessagePump for WinEventPump {
    fn quit_signal(&self) -> Arc<dyn QuitSignal> {
        self.quit.clone()
    }

    fn run(&mut self) -> Result<()> {
        let mut msg = MSG::default();
        loop {
            let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match ret.0 {
                0 => return Ok(()),
                -1 => {
                    return Err(watch_error!(
                        internal,
                        "GetMessageW failed: {}",
                        std::io::Error::last_os_error()
                    ))
                }
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }
}

/// `SetWinEventHook` subscriptions for `EVENT_SYSTEM_FOREGROUND` and
/// `EVENT_OBJECT_CREATE..=EVENT_OBJECT_DESTROY`.
pub struct WinEventHooks;

impl HookBackend for WinEventHooks {
    fn install(&self, handler: EventHandler) -> Result<Box<dyn MessagePump>> {
        // Make sure this thread owns a message queue before anyone posts to it.
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
        }

        HANDLER.with(|slot| *slot.borrow_mut() = Some(handler));
        let slot = HandlerSlot;

        let foreground = WinEventHook::register(
            HookKind::Foreground,
            EVENT_SYSTEM_FOREGROUND,
            EVENT_SYSTEM_FOREGROUND,
        )?;
        // On failure `foreground` and `slot` drop here, releasing the first hook.
        let lifecycle = WinEventHook::register(
            HookKind::ObjectLifecycle,
            EVENT_OBJECT_CREATE,
            EVENT_OBJECT_DESTROY,
        )?;

        let thread_id = unsafe { GetCurrentThreadId() };
        Ok(Box::new(WinEventPump {
            quit: Arc::new(ThreadQuit { thread_id }),
            _hooks: [foreground, lifecycle],
            _handler: slot,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn panicking_handler_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut handler: EventHandler = Box::new(move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first event fails");
            }
        });

        assert!(!dispatch(&mut handler));
        assert!(dispatch(&mut handler));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
