use super::r#trait::{HookBackend, QuitSignal};
use crate::error::{Result, WatchError};
use crate::watch_error;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Set on the pump thread so `stop` called from the handler can quit without joining itself.
    static PUMP_QUIT: RefCell<Option<(u64, Arc<dyn QuitSignal>)>> = const { RefCell::new(None) };
}

/// Quit signal of the pump running on this thread, if it belongs to watcher `id`.
fn own_pump(id: u64) -> Option<Arc<dyn QuitSignal>> {
    PUMP_QUIT.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, quit)| quit.clone())
    })
}

struct Running {
    quit: Arc<dyn QuitSignal>,
    thread: JoinHandle<Result<()>>,
}

/// Owns the background thread that holds the OS hooks and pumps their events.
///
/// `start` returns once both hooks are registered. `stop` quits the pump and
/// returns after both hooks are released; it is idempotent and may be called
/// concurrently. Dropping the watcher stops it.
pub struct EventWatcher {
    id: u64,
    backend: Arc<dyn HookBackend>,
    state: Mutex<Option<Running>>,
}

impl EventWatcher {
    pub fn new(backend: Arc<dyn HookBackend>) -> Self {
        Self {
            id: NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            state: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        if own_pump(self.id).is_some() {
            return true;
        }
        self.state
            .lock()
            .as_ref()
            .is_some_and(|running| !running.thread.is_finished())
    }

    /// Registers the hooks and starts dispatching events to `handler`.
    ///
    /// `handler` runs on the watcher thread, once per event; a slow handler
    /// delays the events queued behind it.
    pub fn start<F>(&self, handler: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(running) = state.take() {
            if !running.thread.is_finished() {
                *state = Some(running);
                return Err(WatchError::AlreadyRunning);
            }
            // The previous pump ended on its own; its hooks are already gone.
            if let Ok(Err(e)) = running.thread.join() {
                warn!(error = %e, "Restarting after an event pump failure");
            }
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let backend = self.backend.clone();
        let id = self.id;

        let thread = thread::Builder::new()
            .name("activewatch-events".to_string())
            .spawn(move || -> Result<()> {
                let mut pump = match backend.install(Box::new(handler)) {
                    Ok(pump) => pump,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };

                let quit = pump.quit_signal();
                PUMP_QUIT.with(|slot| *slot.borrow_mut() = Some((id, quit.clone())));
                if ready_tx.send(Ok(quit)).is_err() {
                    return Ok(());
                }

                info!("Event hooks registered, dispatching desktop events");
                let outcome = pump.run();
                if let Err(e) = &outcome {
                    error!(error = %e, "Event pump stopped abnormally");
                }

                drop(pump);
                PUMP_QUIT.with(|slot| slot.borrow_mut().take());
                debug!("Event hooks released");
                outcome
            })?;

        match ready_rx.recv() {
            Ok(Ok(quit)) => {
                *state = Some(Running { quit, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                error!(error = %e, "Event watcher failed to start");
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(watch_error!(internal, "event thread exited before registering hooks"))
            }
        }
    }

    /// Quits the pump and waits until both hooks are released.
    ///
    /// If the pump had already failed on its own, its error is returned here.
    pub fn stop(&self) -> Result<()> {
        if let Some(quit) = own_pump(self.id) {
            // Called from the handler: the pump exits once the handler returns.
            return quit.post_quit();
        }

        let mut state = self.state.lock();
        let Some(running) = state.take() else {
            return Ok(());
        };

        if !running.thread.is_finished() {
            if let Err(e) = running.quit.post_quit() {
                warn!(error = %e, "Could not signal the event pump to quit");
                *state = Some(running);
                return Err(e);
            }
        }

        let outcome = running
            .thread
            .join()
            .map_err(|_| watch_error!(internal, "event thread panicked"))?;
        info!("Event watcher stopped");
        outcome
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Event watcher did not stop cleanly");
        }
    }
}
