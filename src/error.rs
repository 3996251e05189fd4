use crate::services::event_watcher::HookKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not register {hook} hook: {reason}")]
    HookRegistration { hook: HookKind, reason: String },

    #[error("Could not unregister {hook} hook: {reason}")]
    HookRelease { hook: HookKind, reason: String },

    #[error("Event watcher is already running")]
    AlreadyRunning,

    #[error("Invalid target keyword: {0:?}")]
    InvalidKeyword(String),

    #[error("OS query failed: {0}")]
    Query(String),

    #[error("Not supported on this platform: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatchError {
    pub fn hook_registration(hook: HookKind, reason: impl ToString) -> Self {
        WatchError::HookRegistration {
            hook,
            reason: reason.to_string(),
        }
    }

    pub fn hook_release(hook: HookKind, reason: impl ToString) -> Self {
        WatchError::HookRelease {
            hook,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;

#[macro_export]
macro_rules! watch_error {
    (query, $($arg:tt)*) => {
        $crate::error::WatchError::Query(format!($($arg)*))
    };
    (unsupported, $($arg:tt)*) => {
        $crate::error::WatchError::Unsupported(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::WatchError::Internal(format!($($arg)*))
    };
}
