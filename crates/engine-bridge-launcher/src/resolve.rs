//! Engine executable resolution.
//!
//! Resolution order: a configured override wins and is used verbatim (a bare
//! program name goes through PATH first), with executability verified; only
//! when no override is set does the platform default apply. An override that
//! fails verification is an error, never a silent fallback to the default.

use std::path::{Path, PathBuf};

use engine_bridge_core::Settings;

use crate::LaunchError;

/// Engine host binary name on Unix-like platforms.
pub const ENGINE_BINARY: &str = "engine-host";

/// Shared libraries the engine requires on macOS.
pub const MACOS_NATIVE_DEPS: [&str; 2] = ["libcrypto.1.0.0.dylib", "libssl.1.0.0.dylib"];

/// Directory searched for the macOS native dependencies.
pub const MACOS_NATIVE_DEP_DIR: &str = "/usr/local/lib";

/// Platform branch taken during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Other,
}

/// Environment facts that steer the Windows branch.
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    pub platform: Platform,
    /// `%windir%`, when set.
    pub windows_dir: Option<PathBuf>,
    /// Whether this process is a 32-bit host on a 64-bit OS
    /// (`PROCESSOR_ARCHITEW6432` present).
    pub wow64: bool,
}

impl PlatformInfo {
    /// Detect the current platform from the environment.
    #[must_use]
    pub fn detect() -> Self {
        let platform = if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        };

        Self {
            platform,
            windows_dir: std::env::var_os("windir").map(PathBuf::from),
            wow64: std::env::var_os("PROCESSOR_ARCHITEW6432").is_some(),
        }
    }
}

/// Platform-default engine path, before any override is considered.
///
/// On Windows the 64-bit engine lives behind `Sysnative` when this process
/// runs 32-bit on a 64-bit OS; `use_x86_host` forces the `System32` copy.
///
/// # Errors
/// Returns `ExecutableNotFound` when the Windows branch has no `%windir%`.
pub fn default_engine_path(
    info: &PlatformInfo,
    use_x86_host: bool,
) -> Result<PathBuf, LaunchError> {
    match info.platform {
        Platform::Windows => {
            let windir = info
                .windows_dir
                .clone()
                .ok_or_else(|| LaunchError::ExecutableNotFound("windir is not set".into()))?;
            let system_dir = if use_x86_host || !info.wow64 {
                "System32"
            } else {
                "Sysnative"
            };
            Ok(windir
                .join(system_dir)
                .join("EngineHost")
                .join("engine-host.exe"))
        }
        Platform::MacOs => Ok(Path::new("/usr/local/bin").join(ENGINE_BINARY)),
        Platform::Other => Ok(Path::new("/usr/bin").join(ENGINE_BINARY)),
    }
}

/// Native dependencies missing from `lib_dir`.
#[must_use]
pub fn missing_native_dependencies(lib_dir: &Path) -> Vec<PathBuf> {
    MACOS_NATIVE_DEPS
        .iter()
        .map(|name| lib_dir.join(name))
        .filter(|path| !path.is_file())
        .collect()
}

/// Resolve the engine executable for this session attempt.
///
/// # Errors
/// `ExecutableNotAccessible` when a configured override does not verify,
/// `MissingNativeDependency` when the macOS prerequisite check fails,
/// `ExecutableNotFound` when no default exists for the platform.
pub async fn resolve_engine_executable(
    info: &PlatformInfo,
    settings: &Settings,
) -> Result<PathBuf, LaunchError> {
    if let Some(override_path) = settings.developer.engine_exe_path.as_deref() {
        let trimmed = override_path.trim();
        if !trimmed.is_empty() {
            return resolve_override(trimmed).await;
        }
    }

    if info.platform == Platform::MacOs {
        let missing = missing_native_dependencies(Path::new(MACOS_NATIVE_DEP_DIR));
        if !missing.is_empty() {
            return Err(LaunchError::MissingNativeDependency(missing));
        }
    }

    default_engine_path(info, settings.use_x86_host)
}

async fn resolve_override(spec: &str) -> Result<PathBuf, LaunchError> {
    let path = if spec.contains(['/', '\\']) {
        PathBuf::from(spec)
    } else {
        // Bare program name: PATH lookup before the executability check.
        which_async(spec)
            .await
            .ok_or_else(|| LaunchError::ExecutableNotAccessible(PathBuf::from(spec)))?
    };

    if is_executable(&path) {
        tracing::debug!(path = %path.display(), "Using engine executable override");
        Ok(path)
    } else {
        Err(LaunchError::ExecutableNotAccessible(path))
    }
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
