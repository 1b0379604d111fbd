//! Session state rendering for the host status element.

use std::sync::{Arc, OnceLock};

use engine_bridge_core::{StatusItem, UiHost};

/// Overall session state, owned and mutated only by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Running,
    Failed,
}

const fn status_glyph(state: SessionState) -> (&'static str, &'static str) {
    match state {
        SessionState::Running => ("$(terminal)", "#affc74"),
        SessionState::Initializing => ("$(sync)", "#f3fc74"),
        SessionState::Failed => ("$(alert)", "#fcc174"),
    }
}

/// Publishes session state into a single persistent status element.
///
/// The element is created lazily on first use; at most one exists for the
/// publisher's lifetime.
pub struct StatusPublisher {
    ui: Arc<dyn UiHost>,
    item: OnceLock<Arc<dyn StatusItem>>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new(ui: Arc<dyn UiHost>) -> Self {
        Self {
            ui,
            item: OnceLock::new(),
        }
    }

    /// Render `state` with the given text into the status element.
    pub fn set_status(&self, text: &str, state: SessionState) {
        let (icon, color) = status_glyph(state);
        let item = self.item.get_or_init(|| self.ui.create_status_item());
        item.set_text(&format!("{icon} {text}"));
        item.set_color(color);
    }
}
