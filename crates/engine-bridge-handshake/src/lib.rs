//! File-based one-shot handshake with the external analysis engine.
//!
//! The engine has no channel back to us while it boots; the only shared
//! primitive is the filesystem. The engine writes a small JSON file at a
//! well-known path once its RPC ports are listening, and we poll for it.
//! The file is consumed (deleted) exactly once per session start.
//!
//! Polling cadence and deadline are deliberately tunable via [`PollPolicy`]:
//! there is no push notification available across the process boundary, so
//! hosts on slow filesystems may want a coarser interval.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{fs, time};

/// Ports advertised by the engine in the session file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionDetails {
    pub language_service_port: u16,
    pub debug_service_port: u16,
}

/// Cadence and deadline for the handshake poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Pause between existence checks.
    pub interval: Duration,
    /// Overall budget before the wait resolves to `Timeout`.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            deadline: Duration::from_secs(60),
        }
    }
}

/// Handshake failure.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Timed out waiting for the engine session file after {0:?}")]
    Timeout(Duration),
    #[error("Session file is malformed: {0}")]
    Parse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read and validate the session file without consuming it.
///
/// # Errors
/// Returns `Parse` for malformed JSON, unknown fields, or a zero port;
/// `Io` if the file cannot be read.
pub async fn read_session_file(path: &Path) -> Result<SessionDetails, HandshakeError> {
    let contents = fs::read_to_string(path).await?;
    let details: SessionDetails =
        serde_json::from_str(&contents).map_err(|e| HandshakeError::Parse(e.to_string()))?;

    if details.language_service_port == 0 || details.debug_service_port == 0 {
        return Err(HandshakeError::Parse(
            "service ports must be positive".into(),
        ));
    }

    Ok(details)
}

/// Delete the session file. Idempotent: a missing file is success.
///
/// # Errors
/// Returns `Io` only for failures other than the file not existing.
pub async fn delete_session_file(path: &Path) -> Result<(), HandshakeError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Poll for the session file, consume it, and return the engine's ports.
///
/// On appearance the file is parsed and then deleted (single consumption).
/// A parse failure leaves the file in place for diagnosis. The future is
/// cancellable; dropping it between polls has no side effects.
///
/// # Errors
/// `Timeout` when the deadline elapses before the file appears, `Parse` for
/// a malformed file, `Io` for filesystem failures.
pub async fn wait_for_session_file(
    path: &Path,
    policy: PollPolicy,
) -> Result<SessionDetails, HandshakeError> {
    let deadline = time::Instant::now() + policy.deadline;

    loop {
        if fs::try_exists(path).await? {
            let details = read_session_file(path).await?;
            delete_session_file(path).await?;
            tracing::debug!(
                port = details.language_service_port,
                "Engine session file consumed"
            );
            return Ok(details);
        }

        if time::Instant::now() >= deadline {
            return Err(HandshakeError::Timeout(policy.deadline));
        }
        time::sleep(policy.interval).await;
    }
}
