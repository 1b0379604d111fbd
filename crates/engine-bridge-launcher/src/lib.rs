//! Engine executable resolution and terminal-attached launch.
//!
//! Provides:
//! - Platform/override resolution of the engine host binary
//! - `StartupArgs` - Typed startup flags with uniform quoting
//! - `launch` - Spawn the engine attached to an interactive terminal

pub mod args;
pub mod launch;
pub mod resolve;

use std::path::PathBuf;

use engine_bridge_core::UiError;
use thiserror::Error;

pub use args::StartupArgs;
pub use launch::launch;
pub use resolve::{Platform, PlatformInfo, resolve_engine_executable};

/// Launch-stage failure.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Engine executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Engine executable cannot be found or is not accessible at {}", .0.display())]
    ExecutableNotAccessible(PathBuf),
    #[error("Missing native dependencies: {0:?}")]
    MissingNativeDependency(Vec<PathBuf>),
    #[error("Failed to quote startup argument: {0}")]
    Quote(#[from] shlex::QuoteError),
    #[error("Terminal spawn failed: {0}")]
    Spawn(#[from] UiError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
