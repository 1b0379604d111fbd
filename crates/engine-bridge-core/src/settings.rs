//! Opaque configuration snapshot.
//!
//! How settings are sourced (editor config, file on disk, test fixture) is
//! the host's business; the session machinery only sees a `Settings` value
//! loaded fresh at the start of every session attempt.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings snapshot consumed by a session attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Prefer the 32-bit engine host on Windows.
    pub use_x86_host: bool,
    pub developer: DeveloperSettings,
}

/// Developer-facing overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeveloperSettings {
    /// Override for the engine executable. Used verbatim when set; a bare
    /// program name is resolved through PATH.
    pub engine_exe_path: Option<String>,
    /// Override for the bundled module directory handed to the engine.
    pub bundled_modules_path: Option<PathBuf>,
    /// Ask the engine to block until a debugger attaches.
    pub wait_for_debugger: bool,
    /// Log level forwarded to the engine, when set.
    pub log_level: Option<String>,
}

/// Source of settings snapshots.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> Settings;
}

/// A fixed snapshot is itself a provider. Handy for tests and for hosts
/// whose configuration cannot change at runtime.
impl SettingsProvider for Settings {
    fn load(&self) -> Settings {
        self.clone()
    }
}
