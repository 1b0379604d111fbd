//! Composition context for the bridge.
//!
//! Everything the session manager collaborates with arrives through one
//! explicit context value built at the composition point. There is no
//! module-level shared state; the context's owner decides how many bridge
//! instances exist (normally one per editor window).

use std::{path::PathBuf, sync::Arc};

use crate::{logging::Logger, settings::SettingsProvider, traits::UiHost};

/// Identity of the editor host, forwarded to the engine at startup.
#[derive(Debug, Clone)]
pub struct HostDetails {
    pub name: String,
    pub profile_id: String,
    pub version: String,
}

/// Well-known filesystem locations for one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgePaths {
    /// Directory receiving host and engine log files.
    pub log_dir: PathBuf,
    /// Bundled modules handed to the engine at startup.
    pub modules_dir: PathBuf,
    /// Per-session handshake file written by the engine.
    pub session_file: PathBuf,
}

impl BridgePaths {
    /// Default locations under the platform data directory, with a
    /// temp-dir fallback. The session file is keyed by pid so concurrent
    /// editor instances never rendezvous on the same file.
    #[must_use]
    pub fn with_defaults(app_name: &str) -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(app_name);
        Self {
            log_dir: base.join("logs"),
            modules_dir: base.join("modules"),
            session_file: std::env::temp_dir()
                .join(app_name)
                .join(format!("session-{}.json", std::process::id())),
        }
    }
}

/// Context handed to every collaborator at construction.
#[derive(Clone)]
pub struct BridgeContext {
    pub ui: Arc<dyn UiHost>,
    pub logger: Arc<Logger>,
    pub settings: Arc<dyn SettingsProvider>,
    pub paths: BridgePaths,
    pub host: HostDetails,
}
