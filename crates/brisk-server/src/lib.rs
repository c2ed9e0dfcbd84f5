//! Preview server with live reload for brisk.
//!
//! Watches the source tree, rebuilds the affected steps, and tells
//! connected browsers to refresh over a WebSocket.

pub mod changes;
pub mod server;
pub mod watch;
pub mod watcher;
pub mod websocket;

pub use changes::ChangeSet;
pub use server::{PreviewConfig, PreviewServer, ServerError};
pub use watch::WatchLoop;
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{ReloadHub, ReloadMessage};
