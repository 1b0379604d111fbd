//! Duplex socket transport and RPC client seam for the engine.
//!
//! The wire format and method surface of the RPC protocol are somebody
//! else's problem: this crate opens the socket the engine advertised in the
//! handshake, wraps it as a bidirectional transport, and defines the traits
//! a concrete client implementation plugs into. The session manager only
//! ever sees `RpcClient`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::{
    TcpStream,
    tcp::{OwnedReadHalf, OwnedWriteHalf},
};

/// Connection-stage failure.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Could not connect to engine on port {port}: {source}")]
    Connect {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Engine rejected the ready signal: {0}")]
    ReadyRejected(String),
}

/// The duplex socket, split into the two halves an RPC channel needs.
#[derive(Debug)]
pub struct SocketTransport {
    pub reader: OwnedReadHalf,
    pub writer: OwnedWriteHalf,
}

/// Scope the RPC client binds to.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Document languages the client handles.
    pub document_selector: Vec<String>,
    /// Configuration section synchronized with the engine.
    pub configuration_section: String,
}

/// Open the duplex socket to the engine's language service port.
///
/// Suspends until the connection is established; local-only by contract
/// (the engine always listens on the loopback interface).
///
/// # Errors
/// Returns `Connect` when the socket cannot be opened (refused, unreachable).
pub async fn connect(port: u16) -> Result<SocketTransport, ConnectError> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|source| ConnectError::Connect { port, source })?;
    tracing::debug!(port, "Engine socket connected");

    let (reader, writer) = stream.into_split();
    Ok(SocketTransport { reader, writer })
}

/// A started RPC client bound to a live transport.
///
/// Handed out to feature consumers as a shared reference; only the session
/// manager stops it.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Resolves once the engine declares itself initialized, or with the
    /// rejection reason.
    async fn ready(&self) -> Result<(), ConnectError>;

    /// Stop the client and release its transport. Idempotent.
    async fn stop(&self);
}

/// Builds and starts a concrete RPC client over an established transport.
#[async_trait]
pub trait RpcClientFactory: Send + Sync {
    async fn create(
        &self,
        transport: SocketTransport,
        options: ClientOptions,
    ) -> Arc<dyn RpcClient>;
}
