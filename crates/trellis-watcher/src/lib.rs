//! Markdown vault on disk as a live document store

pub mod store;
pub mod watcher;

pub use store::VaultStore;
pub use watcher::{FileWatcher, Subscribers};
