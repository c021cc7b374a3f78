//! Wayland compositor integration
//!
//! - daemon: dispatch state and the blocking event loop
//! - backend: bound globals implementing [`crate::backend::Backend`]
//! - capabilities: which registry globals the daemon needs
//! - event_handlers: Wayland protocol event handlers

mod backend;
mod capabilities;
mod daemon;
mod event_handlers;

pub use backend::WaylandBackend;
pub use daemon::run;

pub(crate) use daemon::WallpaperDaemon;
