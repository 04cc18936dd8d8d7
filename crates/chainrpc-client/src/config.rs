//! [`ClientConfig`]: everything [`crate::Client::connect`] needs to name a
//! durable-object instance and reach it, independent of which
//! [`crate::transport::ClientTransport`] ends up carrying the traffic.

use std::time::Duration;

use chainrpc_validate::ValidationLimits;
use url::Url;

/// Default batch round-trip timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connecting-state send queue byte budget (see
/// [`crate::transport::WebSocketTransport`]).
pub const DEFAULT_QUEUE_BUDGET_BYTES: usize = 8 * 1024 * 1024;

/// Which concrete transport [`crate::Client::connect`] should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One HTTP POST per flushed batch.
    Http,
    /// A persistent WebSocket connection, multiplexing every flushed batch.
    WebSocket,
}

/// Configuration for one [`crate::Client`], addressing exactly one
/// `(binding, instance)` durable object.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `https://example.com` or `wss://example.com`
    /// (the scheme is normalized to match `transport` at connect time).
    pub base_url: Url,
    /// Route prefix segment, matching the server's `chainrpc_core::DEFAULT_PREFIX`
    /// unless the deployment overrides it.
    pub prefix: String,
    /// Durable-object binding name.
    pub binding: String,
    /// Instance key within that binding.
    pub instance: String,
    /// Which transport to build.
    pub transport: TransportKind,
    /// Round-trip timeout for one flushed batch.
    pub timeout: Duration,
    /// Extra headers sent with every request (HTTP) or the WebSocket
    /// upgrade request.
    pub headers: Vec<(String, String)>,
    /// Tag this client registers under for server-initiated downstream
    /// pushes, sent as the `clientId` query parameter on WebSocket connect.
    pub client_id: Option<String>,
    /// Additional WebSocket subprotocols to offer during the upgrade.
    pub additional_protocols: Vec<String>,
    /// Depth/argument-count limits enforced client-side before a chain is
    /// ever sent, mirroring the server's authoritative check.
    pub limits: ValidationLimits,
    /// Byte budget for the WebSocket transport's connecting-state send
    /// queue (unused by [`TransportKind::Http`]).
    pub queue_budget_bytes: usize,
    /// When set, [`crate::Client::batch_handles`] records the flushed
    /// [`chainrpc_codec::BatchRequest`] (retrievable via
    /// [`crate::Client::last_batch`]) instead of actually sending it over
    /// the transport, per spec §4.3's "inspect mode". Every entry in that
    /// batch resolves with [`crate::ClientError::Skipped`]. Test-only;
    /// `false` by default, and there is no public setter that flips it on
    /// by accident — construct it via [`ClientConfig::with_inspect_mode`].
    pub inspect_mode: bool,
}

impl ClientConfig {
    /// Construct a configuration with every optional field at its default.
    #[must_use]
    pub fn new(base_url: Url, binding: impl Into<String>, instance: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            base_url,
            prefix: chainrpc_core::DEFAULT_PREFIX.to_string(),
            binding: binding.into(),
            instance: instance.into(),
            transport,
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
            client_id: None,
            additional_protocols: Vec::new(),
            limits: ValidationLimits::default(),
            queue_budget_bytes: DEFAULT_QUEUE_BUDGET_BYTES,
            inspect_mode: false,
        }
    }

    /// Returns `self` with [`ClientConfig::inspect_mode`] turned on. Test
    /// helper only — production clients should never flush batches without
    /// sending them.
    #[must_use]
    pub fn with_inspect_mode(mut self) -> Self {
        self.inspect_mode = true;
        self
    }

    /// The `{prefix}/{binding}/{instance}/call` path, without scheme/host.
    #[must_use]
    pub fn call_path(&self) -> String {
        format!("{}/{}/{}/call", self.prefix, self.binding, self.instance)
    }

    /// The `{prefix}/{binding}/{instance}` path, without scheme/host.
    #[must_use]
    pub fn upgrade_path(&self) -> String {
        format!("{}/{}/{}", self.prefix, self.binding, self.instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_path_matches_router_shape() {
        let config = ClientConfig::new(Url::parse("http://localhost:8787").unwrap(), "Counter", "abc", TransportKind::Http);
        assert_eq!(config.call_path(), "__rpc/Counter/abc/call");
        assert_eq!(config.upgrade_path(), "__rpc/Counter/abc");
    }
}
