//! people-daemon library: the on-disk store and watcher used by the binary.

pub mod config;
pub mod native_store;
pub mod watcher;

pub use native_store::NativeStore;
pub use watcher::FileWatcher;
