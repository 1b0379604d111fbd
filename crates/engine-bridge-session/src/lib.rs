//! Session orchestration for the engine bridge.
//!
//! Provides:
//! - `SessionManager` - Drive resolve/launch/handshake/connect and recover
//!   from engine death
//! - `StatusPublisher` - Render session state into the host status element
//! - `EngineFeature` - Consumer contract for the live RPC client

pub mod features;
pub mod manager;
pub mod status;

pub use features::EngineFeature;
pub use manager::{SessionCommand, SessionError, SessionManager};
pub use status::{SessionState, StatusPublisher};
