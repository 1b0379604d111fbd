//! Typed startup flags for the engine host.
//!
//! Flags are kept as an ordered list and rendered into a single command
//! string with one quoting function applied to every value, so an embedded
//! space (or worse) in a path can never split or inject arguments.

use std::path::Path;

use engine_bridge_core::HostDetails;

/// One startup flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFlag {
    /// `-Name value` pair; the value is quoted on render.
    Valued { name: &'static str, value: String },
    /// Bare `-Name` switch.
    Switch { name: &'static str },
}

/// Ordered startup flags handed to the engine host.
#[derive(Debug, Clone, Default)]
pub struct StartupArgs {
    flags: Vec<StartupFlag>,
}

impl StartupArgs {
    /// Mandatory flags for a session attempt.
    #[must_use]
    pub fn new(
        required_engine_version: &str,
        host: &HostDetails,
        bundled_modules_path: &Path,
        log_path: &Path,
        session_details_path: &Path,
    ) -> Self {
        let mut args = Self::default();
        args.push_valued("-EngineVersion", required_engine_version);
        args.push_valued("-HostName", &host.name);
        args.push_valued("-HostProfileId", &host.profile_id);
        args.push_valued("-HostVersion", &host.version);
        args.push_valued("-BundledModulesPath", &bundled_modules_path.to_string_lossy());
        args.push_valued("-LogPath", &log_path.to_string_lossy());
        args.push_valued("-SessionDetailsPath", &session_details_path.to_string_lossy());
        args
    }

    /// Ask the engine to block until a debugger attaches.
    #[must_use]
    pub fn wait_for_debugger(mut self, enabled: bool) -> Self {
        if enabled {
            self.flags.push(StartupFlag::Switch {
                name: "-WaitForDebugger",
            });
        }
        self
    }

    /// Forward a log level to the engine, when configured.
    #[must_use]
    pub fn log_level(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level {
            self.push_valued("-LogLevel", level);
        }
        self
    }

    /// The flags in order.
    #[must_use]
    pub fn flags(&self) -> &[StartupFlag] {
        &self.flags
    }

    /// Render into a single command string, quoting every value.
    ///
    /// # Errors
    /// Returns error if a value cannot be safely quoted (embedded NUL).
    pub fn render(&self) -> Result<String, shlex::QuoteError> {
        let mut parts = Vec::with_capacity(self.flags.len() * 2);
        for flag in &self.flags {
            match flag {
                StartupFlag::Valued { name, value } => {
                    parts.push((*name).to_string());
                    parts.push(shlex::try_quote(value)?.into_owned());
                }
                StartupFlag::Switch { name } => parts.push((*name).to_string()),
            }
        }
        Ok(parts.join(" "))
    }

    fn push_valued(&mut self, name: &'static str, value: &str) {
        self.flags.push(StartupFlag::Valued {
            name,
            value: value.to_string(),
        });
    }
}
