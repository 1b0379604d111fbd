//! Core abstractions for the analysis-engine session bridge.
//!
//! This crate provides the fundamental building blocks:
//! - UI host traits (`UiHost`, `Terminal`, `StatusItem`, `Disposable`)
//! - `Logger` - Leveled log sink with user-facing surfacing variants
//! - `LogChannel` - Broadcast + history output channel
//! - `BridgeContext` - Explicit composition context (no globals)
//! - `Settings` - Opaque configuration snapshot

pub mod channel;
pub mod context;
pub mod logging;
pub mod settings;
pub mod traits;

pub use channel::{ChannelMsg, LogChannel};
pub use context::{BridgeContext, BridgePaths, HostDetails};
pub use logging::{LogLevel, Logger};
pub use settings::{Settings, SettingsProvider};
pub use traits::{Disposable, StatusItem, Terminal, TerminalId, TerminalSpawn, UiError, UiHost};
