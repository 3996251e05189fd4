use super::r#trait::{EventHandler, HookBackend, HookKind, MessagePump};
use crate::error::{Result, WatchError};

/// Backend for platforms without desktop event hooks; installation always fails.
pub struct UnsupportedHooks;

impl HookBackend for UnsupportedHooks {
    fn install(&self, _handler: EventHandler) -> Result<Box<dyn MessagePump>> {
        Err(WatchError::hook_registration(
            HookKind::Foreground,
            format!("no desktop event hooks on {}", std::env::consts::OS),
        ))
    }
}
