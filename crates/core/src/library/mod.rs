//! Game library listing and change notification.

/// Descriptor discovery for the live library directory.
pub mod store;
/// Filesystem watcher that reports edits to the live library.
pub mod watch;

pub use store::{load_game, LibraryStore};
pub use watch::{LibraryEvent, LibraryWatcher};
