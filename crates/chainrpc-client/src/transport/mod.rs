//! The transport seam: [`ClientTransport`] is what [`crate::Client`] speaks
//! to, and [`HttpTransport`]/[`WebSocketTransport`] are the two concrete
//! implementations spec §2's "Transport adapters" describes. Neither
//! transport retries a batch itself — fail-fast on disconnect is
//! intentional (spec §1 Non-goals).

mod http;
mod websocket;

pub use http::HttpTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use chainrpc_codec::{BatchRequest, BatchResponse};
use chainrpc_error::RpcError;

/// Heartbeat text this client sends on an open [`WebSocketTransport`]; the
/// durable-instance side auto-responds with [`HEARTBEAT_PONG`]. Mirrors the
/// pair `chainrpc-transport` defines server-side.
pub const HEARTBEAT_PING: &str = "auto-response ping";
/// Expected reply to [`HEARTBEAT_PING`].
pub const HEARTBEAT_PONG: &str = "auto-response pong";

/// A callback invoked for every server-initiated downstream push a
/// transport receives outside of any batch response.
///
/// `Arc`-backed rather than `Box`-backed so [`crate::Client::reconnect`] can
/// hand the same callback to a freshly built transport without requiring
/// callers to re-register it.
pub type DownstreamCallback = std::sync::Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// What [`crate::Client`] needs from a concrete transport: ship a batch,
/// get its matching response, and tear down cleanly on dispose.
///
/// Implementors own their own connection lifecycle; a transport that has
/// not yet finished connecting queues outbound sends rather than blocking
/// [`ClientTransport::send_batch`] itself (see [`WebSocketTransport`]).
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// Send `request` and await its matching [`BatchResponse`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] on disconnect, timeout, or queue
    /// overflow, or [`RpcError::Serialization`] if the response fails to
    /// decode.
    async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse, RpcError>;

    /// Tear down the connection. Every batch still awaiting a response is
    /// resolved with [`chainrpc_error::TransportError::Disposed`]; nothing
    /// in flight is retried.
    async fn dispose(&self);
}
