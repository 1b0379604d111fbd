//! Leveled log sink with user-facing surfacing variants.
//!
//! Every line goes to a timestamped log file and to the UI-visible
//! [`LogChannel`]. The `write_and_show_*` variants additionally raise a
//! dismissible notification carrying a "Show Logs" action that reveals the
//! channel. Library-internal diagnostics use `tracing` as usual; this type
//! is the log surface the *user* sees.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::{channel::LogChannel, traits::UiHost};

/// Notification action that reveals the log channel.
pub const SHOW_LOGS_ACTION: &str = "Show Logs";

/// Log severity. Ordering matters: messages below the configured minimum
/// are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Verbose,
    Normal,
    Warning,
    Error,
}

impl LogLevel {
    const fn label(self) -> &'static str {
        match self {
            Self::Verbose => "VERBOSE",
            Self::Normal => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Timestamped, leveled write sink for one bridge instance.
pub struct Logger {
    min_level: LogLevel,
    ui: Arc<dyn UiHost>,
    channel: Arc<LogChannel>,
    file: Mutex<BufWriter<File>>,
    log_file_path: PathBuf,
}

impl Logger {
    /// Open a fresh timestamped log file under `log_dir` (created if
    /// missing) and bind the logger to the UI host and output channel.
    ///
    /// # Errors
    /// Returns error if the log directory or file cannot be created.
    pub async fn new(
        min_level: LogLevel,
        ui: Arc<dyn UiHost>,
        channel: Arc<LogChannel>,
        log_dir: &Path,
    ) -> io::Result<Self> {
        fs::create_dir_all(log_dir).await?;
        let log_file_path = log_dir.join(log_file_name("bridge"));
        let file = File::options()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .await?;

        Ok(Self {
            min_level,
            ui,
            channel,
            file: Mutex::new(BufWriter::new(file)),
            log_file_path,
        })
    }

    /// Path of the log file backing this logger.
    #[must_use]
    pub fn log_file_path(&self) -> &Path {
        &self.log_file_path
    }

    /// The UI-visible channel this logger appends to.
    #[must_use]
    pub fn channel(&self) -> &Arc<LogChannel> {
        &self.channel
    }

    /// Write a message at the given level, dropping it when below the
    /// configured minimum.
    pub async fn write_at_level(&self, level: LogLevel, message: &str) {
        if level < self.min_level {
            return;
        }

        let line = format!(
            "[{} {}] {message}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.label()
        );
        self.channel.push_line(line.clone());

        let mut guard = self.file.lock().await;
        let written = async {
            guard.write_all(line.as_bytes()).await?;
            guard.write_all(b"\n").await?;
            guard.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::error!("Failed to append to log file: {e}");
        }
    }

    pub async fn write(&self, message: &str) {
        self.write_at_level(LogLevel::Normal, message).await;
    }

    pub async fn write_verbose(&self, message: &str) {
        self.write_at_level(LogLevel::Verbose, message).await;
    }

    pub async fn write_warning(&self, message: &str) {
        self.write_at_level(LogLevel::Warning, message).await;
    }

    pub async fn write_error(&self, message: &str) {
        self.write_at_level(LogLevel::Error, message).await;
    }

    /// Write a warning and surface it as a notification with a
    /// "Show Logs" action.
    pub async fn write_and_show_warning(&self, message: &str) {
        self.write_warning(message).await;
        let choice = self.ui.show_warning(message, &[SHOW_LOGS_ACTION]).await;
        if choice.as_deref() == Some(SHOW_LOGS_ACTION) {
            self.show_log_panel();
        }
    }

    /// Write an error and surface it as a notification with a
    /// "Show Logs" action.
    pub async fn write_and_show_error(&self, message: &str) {
        self.write_error(message).await;
        let choice = self.ui.show_error(message, &[SHOW_LOGS_ACTION]).await;
        if choice.as_deref() == Some(SHOW_LOGS_ACTION) {
            self.show_log_panel();
        }
    }

    /// Reveal the log channel in the host UI.
    pub fn show_log_panel(&self) {
        self.channel.reveal();
    }
}

fn log_file_name(base: &str) -> String {
    format!("{}-{base}.log", chrono::Utc::now().timestamp())
}
