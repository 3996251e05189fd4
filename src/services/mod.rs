pub mod event_watcher;
pub mod target_matcher;
pub mod target_registry;

pub use event_watcher::{EventWatcher, HookBackend};
pub use target_matcher::{Desktop, MatchResult, MatchSource, TargetMatcher};
pub use target_registry::TargetRegistry;
