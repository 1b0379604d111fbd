//! Spawn the engine host attached to an interactive terminal.

use std::path::Path;

use engine_bridge_core::{Terminal, TerminalSpawn, UiHost};
use engine_bridge_handshake::{HandshakeError, delete_session_file};

use crate::{LaunchError, StartupArgs, resolve::Platform};

/// Title of the terminal surface hosting the engine console.
pub const CONSOLE_TITLE: &str = "Engine Interactive Console";

/// Launch the engine host in a new, visible terminal.
///
/// Any session file left behind by a crashed prior session is deleted first
/// so it cannot satisfy the new handshake. The engine is invoked with
/// no-profile/no-exit shell flags (plus an execution-policy override on the
/// Windows branch) and a single composed `-Command` string carrying the
/// startup flags.
///
/// # Errors
/// `Quote` if the startup flags cannot be rendered, `Spawn` if the host
/// fails to create the terminal, `Io` for a failed stale-file cleanup.
pub async fn launch(
    ui: &dyn UiHost,
    platform: Platform,
    executable: &Path,
    startup_args: &StartupArgs,
    session_file: &Path,
) -> Result<Box<dyn Terminal>, LaunchError> {
    match delete_session_file(session_file).await {
        Ok(()) => {}
        Err(HandshakeError::Io(e)) => return Err(e.into()),
        // Timeout/Parse cannot come out of a delete.
        Err(other) => {
            tracing::warn!("Unexpected stale-file cleanup failure: {other}");
        }
    }

    let mut args = vec!["-NoProfile".to_string(), "-NoExit".to_string()];
    if platform == Platform::Windows {
        args.push("-ExecutionPolicy".to_string());
        args.push("Unrestricted".to_string());
    }
    args.push("-Command".to_string());
    args.push(startup_args.render()?);

    tracing::info!(executable = %executable.display(), "Launching engine host");

    let terminal = ui
        .create_terminal(TerminalSpawn {
            title: CONSOLE_TITLE.to_string(),
            program: executable.to_path_buf(),
            args,
        })
        .await?;
    terminal.show();

    Ok(terminal)
}
