//! PTY-backed terminal surface.
//!
//! Editors bring their own terminal widget; hosts without one (the demo
//! binary, integration tests) use `PtyTerminal`, which spawns the engine on
//! a real pseudo-terminal and reports child exit over a broadcast channel,
//! the feed behind terminal-closed notifications.

pub mod terminal;

pub use terminal::{PtyError, PtyTerminal};
