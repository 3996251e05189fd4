use super::r#trait::{EventHandler, HookBackend, MessagePump, QuitSignal};
use crate::error::Result;
use crate::services::target_matcher::DryRunDesktop;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Emulated hooks: one synthetic event per interval, no OS subscriptions.
pub struct DryRunHooks {
    interval: Duration,
    desktop: Arc<DryRunDesktop>,
}

impl DryRunHooks {
    pub fn new(interval: Duration, desktop: Arc<DryRunDesktop>) -> Self {
        Self { interval, desktop }
    }
}

struct ChannelQuit(Mutex<Sender<()>>);

impl QuitSignal for ChannelQuit {
    fn post_quit(&self) -> Result<()> {
        // A closed channel means the pump is already gone.
        let _ = self.0.lock().send(());
        Ok(())
    }
}

struct DryRunPump {
    interval: Duration,
    desktop: Arc<DryRunDesktop>,
    handler: EventHandler,
    quit_rx: Receiver<()>,
    quit: Arc<ChannelQuit>,
}

impl MessagePump for DryRunPump {
    fn quit_signal(&self) -> Arc<dyn QuitSignal> {
        self.quit.clone()
    }

    fn run(&mut self) -> Result<()> {
        info!(interval_ms = self.interval.as_millis() as u64, "Dry-run: emulating desktop events");
        loop {
            match self.quit_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.desktop.advance();
                    (self.handler)();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}

impl Drop for DryRunPump {
    fn drop(&mut self) {
        info!("Dry-run: emulated hooks released");
    }
}

impl HookBackend for DryRunHooks {
    fn install(&self, handler: EventHandler) -> Result<Box<dyn MessagePump>> {
        let (quit_tx, quit_rx) = mpsc::channel();
        Ok(Box::new(DryRunPump {
            interval: self.interval,
            desktop: self.desktop.clone(),
            handler,
            quit_rx,
            quit: Arc::new(ChannelQuit(Mutex::new(quit_tx))),
        }))
    }
}
