//! Feature consumer contract.

use std::sync::Arc;

use engine_bridge_rpc::RpcClient;

/// An extension feature that talks to the engine once a session is ready.
///
/// The session manager fans the client out after every successful start;
/// each feature receives the identical shared reference and must treat it
/// as use-only (the manager alone stops it).
pub trait EngineFeature: Send + Sync {
    /// Receive the live RPC client for a freshly started session.
    fn set_rpc_client(&self, client: Arc<dyn RpcClient>);

    /// Release feature resources at extension shutdown.
    fn dispose(&self) {}
}
