//! PTY terminal implementation of `engine_bridge_core::Terminal`.

use std::{
    io::{Read, Write},
    sync::Mutex,
};

use engine_bridge_core::{Terminal, TerminalId, TerminalSpawn};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use thiserror::Error;
use tokio::sync::broadcast;

/// PTY error.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Failed to open pty: {0}")]
    Open(String),
    #[error("Failed to spawn command: {0}")]
    Spawn(String),
}

/// A terminal surface backed by a native pseudo-terminal.
///
/// The child's exit is watched on a blocking task; when it exits for any
/// reason (including `dispose`), the terminal's id is broadcast on the
/// channel supplied at spawn time.
pub struct PtyTerminal {
    id: TerminalId,
    title: String,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    // Held to keep the pty pair (and the writer) alive.
    _master: Mutex<Box<dyn MasterPty + Send>>,
    disposed: bool,
}

impl PtyTerminal {
    /// Spawn `spawn.program` on a fresh pty.
    ///
    /// # Errors
    /// Returns error if the pty cannot be opened or the command fails to
    /// spawn.
    pub fn spawn(
        spawn: TerminalSpawn,
        closed_tx: broadcast::Sender<TerminalId>,
    ) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize::default())
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spawn.program);
        cmd.args(&spawn.args);

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        // The slave side belongs to the child now.
        drop(pair.slave);

        let killer = child.clone_killer();
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let id = TerminalId::new_v4();

        // Drain output so the child never stalls on a full pty buffer.
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        tokio::task::spawn_blocking(move || {
            let status = child.wait();
            tracing::debug!(%id, ?status, "Terminal child exited");
            let _ = closed_tx.send(id);
        });

        Ok(Self {
            id,
            title: spawn.title,
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            _master: Mutex::new(pair.master),
            disposed: false,
        })
    }

    /// Title given at spawn time.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Terminal for PtyTerminal {
    fn id(&self) -> TerminalId {
        self.id
    }

    fn send_text(&self, text: &str, add_newline: bool) {
        let mut writer = self.writer.lock().unwrap();
        let _ = writer.write_all(text.as_bytes());
        if add_newline {
            let _ = writer.write_all(b"\r");
        }
        let _ = writer.flush();
    }

    fn show(&self) {
        // Headless surface; nothing to bring into view.
        tracing::debug!(id = %self.id, "Terminal show requested");
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Err(e) = self.killer.lock().unwrap().kill() {
            tracing::debug!(id = %self.id, "Kill on dispose failed (already exited?): {e}");
        }
    }
}
