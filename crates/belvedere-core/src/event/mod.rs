// Belvedere Event Handling
// The daemon's cooperative event loop

pub mod r#loop;

pub use r#loop::{Daemon, DaemonEvent, DaemonOptions, EventLoopError, EventLoopResult};
