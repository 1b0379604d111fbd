//! Broadcast + history output channel.
//!
//! Backs the UI-visible half of the [`Logger`](crate::logging::Logger): a
//! host surface that attaches late (the user opens the log panel minutes
//! into a session) receives the retained history first, then switches to
//! live lines.

use std::{
    collections::VecDeque,
    sync::RwLock,
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// History size limit (1 MB of retained log text).
const HISTORY_BYTES: usize = 1024 * 1024;

/// Message on the output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMsg {
    /// One rendered log line.
    Line(String),
    /// Request to bring the channel into view ("Show Logs").
    Reveal,
}

struct StoredLine {
    line: String,
    bytes: usize,
}

struct Inner {
    history: VecDeque<StoredLine>,
    total_bytes: usize,
}

/// Output channel with broadcast and history support.
pub struct LogChannel {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<ChannelMsg>,
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LogChannel {
    /// Create a new output channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
            }),
            sender,
        }
    }

    /// Append a line, broadcasting to live subscribers and retaining it in
    /// history (oldest lines evicted beyond the byte cap).
    pub fn push_line<S: Into<String>>(&self, line: S) {
        let line = line.into();
        let _ = self.sender.send(ChannelMsg::Line(line.clone()));

        let bytes = line.len();
        let mut inner = self.inner.write().unwrap();
        while inner.total_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        inner.history.push_back(StoredLine { line, bytes });
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Ask the host to bring the channel into view. Not retained in history.
    pub fn reveal(&self) {
        let _ = self.sender.send(ChannelMsg::Reveal);
    }

    /// Get a receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMsg> {
        self.sender.subscribe()
    }

    /// Snapshot of the retained lines.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap()
            .history
            .iter()
            .map(|s| s.line.clone())
            .collect()
    }

    /// Stream that yields history first, then live updates.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, ChannelMsg> {
        let (history, rx) = (self.history(), self.subscribe());

        let hist = futures::stream::iter(history.into_iter().map(ChannelMsg::Line));
        let live =
            BroadcastStream::new(rx).filter_map(|res: Result<ChannelMsg, _>| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
