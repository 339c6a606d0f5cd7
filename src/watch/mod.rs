//! Filesystem watching: event filtering, debouncing and the watch loop.

mod debounce;
mod filter;
mod watcher;

pub use debounce::{DEBOUNCE_WINDOW, Debouncer};
pub use filter::EventFilter;
pub use watcher::{WatchLoop, WatchState};
