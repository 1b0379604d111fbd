//! Traits for the abstract UI host.
//!
//! The editor's UI primitives (terminal, status bar, notifications, command
//! palette) live behind these traits so the session machinery never links
//! against a specific editor API. Hosts implement them once at the
//! composition point; tests use stubs.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Identity of a terminal surface.
pub type TerminalId = Uuid;

/// A spawn request for an interactive terminal surface.
#[derive(Debug, Clone)]
pub struct TerminalSpawn {
    /// Title shown on the terminal tab.
    pub title: String,
    /// Program to run inside the terminal.
    pub program: PathBuf,
    /// Argument vector passed to the program.
    pub args: Vec<String>,
}

/// UI host error.
#[derive(Debug, Error)]
pub enum UiError {
    #[error("Terminal spawn failed: {0}")]
    SpawnFailed(String),
}

/// The abstract editor surface.
///
/// Notification methods resolve to the label of the action the user picked,
/// or `None` if the notification was dismissed.
#[async_trait]
pub trait UiHost: Send + Sync {
    /// Create a new interactive terminal running `spawn`.
    async fn create_terminal(&self, spawn: TerminalSpawn) -> Result<Box<dyn Terminal>, UiError>;

    /// Show a dismissible error notification with optional action buttons.
    async fn show_error(&self, message: &str, actions: &[&str]) -> Option<String>;

    /// Show a dismissible warning notification with optional action buttons.
    async fn show_warning(&self, message: &str, actions: &[&str]) -> Option<String>;

    /// Show a quick-pick menu and resolve to the chosen label.
    async fn show_quick_pick(&self, items: &[&str]) -> Option<String>;

    /// Create a persistent status element.
    fn create_status_item(&self) -> Arc<dyn StatusItem>;

    /// Register a named command with the host palette.
    ///
    /// Dispatch is host-driven: the host invokes the session manager with a
    /// `SessionCommand` when the user triggers the command. The returned
    /// handle unregisters the command when disposed.
    fn register_command(&self, name: &str) -> Box<dyn Disposable>;

    /// Subscribe to terminal-closed notifications for every terminal the
    /// host owns, not just ones created through `create_terminal`.
    fn subscribe_terminal_closed(&self) -> broadcast::Receiver<TerminalId>;
}

/// A live terminal surface owning an external process.
pub trait Terminal: Send + Sync {
    /// Stable identity, used for ownership checks on close notifications.
    fn id(&self) -> TerminalId;

    /// Send text to the process as if typed, optionally followed by Enter.
    fn send_text(&self, text: &str, add_newline: bool);

    /// Bring the terminal into view.
    fn show(&self);

    /// Tear down the terminal and the process attached to it.
    fn dispose(&mut self);
}

/// A single text + color status element.
pub trait StatusItem: Send + Sync {
    fn set_text(&self, text: &str);
    fn set_color(&self, color: &str);
}

/// A host resource released exactly once.
pub trait Disposable: Send + Sync {
    fn dispose(&mut self);
}
