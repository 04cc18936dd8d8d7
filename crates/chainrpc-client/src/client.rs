//! [`Client`]: the façade spec §3 calls the "RPC session" — owns one
//! transport, the shared `refId` counter every [`ChainHandle`] descending
//! from this client allocates from, and the explicit/auto-flush batching
//! spec §4.3 describes as the Rust analogue of tick-based auto-batching.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chainrpc_codec::{BatchItemStatus, decode_encoded};
use chainrpc_core::value::Encoded;
use chainrpc_error::{RpcError, TransportError};
use chainrpc_validate::validate_chain;
use tokio::sync::RwLock;

use crate::batch::build_request;
use crate::config::{ClientConfig, TransportKind};
use crate::error::ClientError;
use crate::handle::ChainHandle;
use crate::transport::{ClientTransport, DownstreamCallback, HttpTransport, WebSocketTransport};

pub(crate) struct ClientInner {
    config: ClientConfig,
    ref_counter: Arc<AtomicU64>,
    transport: RwLock<Arc<dyn ClientTransport>>,
    batch_counter: AtomicU64,
    /// Set once [`Client::dispose`] runs or a transport reports
    /// disconnection; the next [`Client::batch`] call transparently
    /// reconnects rather than failing forever, per spec §1/§5's
    /// "auto-reconnect on next call".
    disposed: AtomicBool,
    on_downstream: Option<DownstreamCallback>,
    /// Last batch flushed while `config.inspect_mode` was on (spec §4.3).
    last_batch: std::sync::Mutex<Option<chainrpc_codec::BatchRequest>>,
}

fn build_transport(config: &ClientConfig, on_downstream: Option<DownstreamCallback>) -> Result<Arc<dyn ClientTransport>, ClientError> {
    Ok(match config.transport {
        TransportKind::Http => Arc::new(HttpTransport::connect(config)?),
        TransportKind::WebSocket => Arc::new(WebSocketTransport::connect(config, on_downstream)?),
    })
}

/// A session against one `(binding, instance)` durable-object target.
///
/// Cloning a `Client` shares the same underlying connection and `refId`
/// counter — it is cheap, value-typed handle sharing, the same shape as
/// [`ChainHandle`] itself.
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl Client {
    /// Connect a new client for `config`, building whichever transport
    /// `config.transport` names.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] if the transport cannot even begin
    /// connecting (malformed URL, invalid header).
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        Self::connect_with_downstream(config, None)
    }

    /// Connect a new client, registering `on_downstream` to be invoked for
    /// every server-initiated downstream push the transport receives
    /// outside of a batch response. A no-op for [`TransportKind::Http`],
    /// which has no out-of-band channel to push on.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] if the transport cannot even begin
    /// connecting (malformed URL, invalid header).
    pub fn connect_with_downstream(config: ClientConfig, on_downstream: Option<DownstreamCallback>) -> Result<Self, ClientError> {
        let transport = build_transport(&config, on_downstream.clone())?;

        Ok(Self(Arc::new(ClientInner {
            config,
            ref_counter: Arc::new(AtomicU64::new(0)),
            transport: RwLock::new(transport),
            batch_counter: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            on_downstream,
            last_batch: std::sync::Mutex::new(None),
        })))
    }

    /// Transparently construct a fresh transport in place of whatever this
    /// client currently holds, matching spec §1's "the next call after an
    /// explicit dispose may transparently construct a fresh transport". The
    /// stale transport is disposed first so nothing it still holds pending
    /// resolves twice.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Rpc`] if the new transport cannot even begin
    /// connecting; the client is left on its previous (disposed) transport
    /// in that case.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let fresh = build_transport(&self.0.config, self.0.on_downstream.clone())?;
        self.0.transport.read().await.dispose().await;
        *self.0.transport.write().await = fresh;
        self.0.disposed.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self(inner)
    }

    /// Start a new root handle under this client, recording an initial
    /// `Get` on `key` — the entry point into the durable object's exposed
    /// surface (e.g. `client.root("counter")`).
    #[must_use]
    pub fn root(&self, key: impl Into<String>) -> ChainHandle {
        ChainHandle::root(Arc::downgrade(&self.0), Arc::clone(&self.0.ref_counter), key)
    }

    /// Run `f` against a fresh [`BatchScope`], then flush every handle it
    /// registered as one batch — the explicit start/end bracket spec §9's
    /// design notes call for in place of a host language's implicit
    /// microtask tick:
    ///
    /// ```ignore
    /// let results = client.batch(|scope| {
    ///     scope.add(client.root("counter").get("increment").apply(vec![]));
    ///     scope.add(client.root("counter").get("add").apply(vec![1.0.into()]));
    /// }).await;
    /// ```
    ///
    /// `f` only registers handles; it never sees results — those only exist
    /// once the whole scope has been flushed, mirroring how a pipelined
    /// argument is never resolved until the batch that embeds it is sent.
    /// Returns one result per call to [`BatchScope::add`], in call order.
    pub async fn batch<F>(&self, f: F) -> Vec<Result<Encoded, ClientError>>
    where
        F: FnOnce(&BatchScope),
    {
        let scope = BatchScope::default();
        f(&scope);
        self.batch_handles(scope.into_handles()).await
    }

    /// Flush every handle in `handles` as one batch, returning a result per
    /// handle in the same order. The lower-level primitive [`Client::batch`]
    /// is built on: everything passed here travels in one
    /// [`chainrpc_codec::BatchRequest`], with [`crate::batch::dedupe_nested_markers`]
    /// applied across the whole set.
    ///
    /// Each chain is validated against `config.limits` before the batch is
    /// sent; a chain that fails validation surfaces as
    /// [`ClientError::Rpc`] for its own slot without blocking the rest of
    /// the batch from being sent.
    pub async fn batch_handles(&self, handles: Vec<ChainHandle>) -> Vec<Result<Encoded, ClientError>> {
        if handles.is_empty() {
            return Vec::new();
        }

        if self.0.disposed.load(Ordering::Relaxed) {
            if let Err(err) = self.reconnect().await {
                return handles.iter().map(|_| Err(err.clone())).collect();
            }
        }

        let mut results: Vec<Option<Result<Encoded, ClientError>>> = vec![None; handles.len()];
        let mut sendable = Vec::new();
        for (index, handle) in handles.iter().enumerate() {
            if let Err(err) = validate_chain(handle.chain(), self.0.config.limits) {
                results[index] = Some(Err(ClientError::Rpc(RpcError::Validation(err))));
            } else {
                sendable.push((index, handle.clone()));
            }
        }

        if !sendable.is_empty() {
            let sendable_handles: Vec<ChainHandle> = sendable.iter().map(|(_, h)| h.clone()).collect();
            let id = self.0.batch_counter.fetch_add(1, Ordering::Relaxed).to_string();
            let request = build_request(id, &sendable_handles);

            if self.0.config.inspect_mode {
                *self.0.last_batch.lock().unwrap() = Some(request);
                let skipped = Err(ClientError::Skipped {
                    reason: "inspect mode enabled: batch recorded, not sent".to_string(),
                });
                for (original_index, _) in &sendable {
                    results[*original_index] = Some(skipped.clone());
                }
                return results.into_iter().map(|r| r.expect("every handle slot is filled by validation or inspect mode")).collect();
            }

            let transport = self.0.transport.read().await.clone();
            match transport.send_batch(&request).await {
                Ok(response) => {
                    for (item, (original_index, _)) in response.results.into_iter().zip(sendable.iter()) {
                        results[*original_index] = Some(decode_item(item));
                    }
                }
                Err(err) => {
                    if matches!(err, RpcError::Transport(TransportError::Disconnected | TransportError::Disposed)) {
                        self.0.disposed.store(true, Ordering::Relaxed);
                    }
                    let failure = Err(ClientError::Rpc(err));
                    for (original_index, _) in &sendable {
                        results[*original_index] = Some(failure.clone());
                    }
                }
            }
        }

        results.into_iter().map(|r| r.expect("every handle slot is filled by validation or the batch response")).collect()
    }

    /// Resolve a single handle, as its own one-chain batch.
    ///
    /// # Errors
    ///
    /// See [`Client::batch_handles`].
    pub async fn resolve(&self, handle: ChainHandle) -> Result<Encoded, ClientError> {
        self.batch_handles(vec![handle]).await.into_iter().next().expect("batch of one handle returns exactly one result")
    }

    /// The most recent batch recorded while `config.inspect_mode` was on,
    /// for test assertions about chain shape, refId aliasing, and batch
    /// ordering without a live transport (spec §4.3 "inspect mode").
    /// Always `None` when `inspect_mode` is off.
    #[must_use]
    pub fn last_batch(&self) -> Option<chainrpc_codec::BatchRequest> {
        self.0.last_batch.lock().unwrap().clone()
    }

    /// Tear down the underlying transport. Every batch still awaiting a
    /// response resolves with [`chainrpc_error::TransportError::Disposed`].
    /// The client is left usable: the next [`Client::batch_handles`]/
    /// [`Client::resolve`] call transparently reconnects (see
    /// [`Client::reconnect`]).
    pub async fn dispose(&self) {
        self.0.disposed.store(true, Ordering::Relaxed);
        self.0.transport.read().await.dispose().await;
    }
}

/// Accumulates handles registered inside one [`Client::batch`] closure.
///
/// Registration only records a handle — `add` returns nothing, since no
/// result exists until the whole scope is flushed. A handle embedding
/// another (via [`crate::ArgValue::Handle`]) need not itself be added to the
/// scope; only the leaf handles whose results the caller actually wants
/// need registering, per [`crate::filter_to_leaves`]'s prefix-filtering
/// logic (`Client::batch` does not call it automatically — apply it to your
/// own handle list first if you want that trimming).
#[derive(Default)]
pub struct BatchScope {
    handles: std::sync::Mutex<Vec<ChainHandle>>,
}

impl BatchScope {
    /// Register `handle` to be resolved when the enclosing [`Client::batch`]
    /// call flushes.
    pub fn add(&self, handle: ChainHandle) {
        self.handles.lock().unwrap().push(handle);
    }

    fn into_handles(self) -> Vec<ChainHandle> {
        self.handles.into_inner().unwrap()
    }
}

fn decode_item(item: chainrpc_codec::BatchItemResult) -> Result<Encoded, ClientError> {
    match item.status {
        BatchItemStatus::Success => {
            let wire = item.result.unwrap_or(serde_json::Value::Null);
            decode_encoded(&wire).map_err(|err| ClientError::Rpc(RpcError::Serialization(err)))
        }
        BatchItemStatus::Failed { code, name, message, stack, cause, custom } => {
            Err(ClientError::remote(code, name, message, stack, cause, custom))
        }
        BatchItemStatus::Skipped { reason } => Err(ClientError::Skipped { reason }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainrpc_codec::{BatchItemResult, BatchResponse, encode_value};
    use chainrpc_core::value::Value;
    use chainrpc_validate::ValidationLimits;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    struct MockTransport {
        response: Mutex<Option<Result<BatchResponse, RpcError>>>,
        calls: AtomicUsize,
        disposed: AtomicBool,
    }

    impl MockTransport {
        fn new(response: Result<BatchResponse, RpcError>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                calls: AtomicUsize::new(0),
                disposed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ClientTransport for MockTransport {
        async fn send_batch(&self, _request: &chainrpc_codec::BatchRequest) -> Result<BatchResponse, RpcError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.response.lock().unwrap().take().expect("mock transport called more times than expected")
        }

        async fn dispose(&self) {
            self.disposed.store(true, Ordering::Relaxed);
        }
    }

    fn test_client(transport: Arc<dyn ClientTransport>) -> Client {
        let config = ClientConfig::new(Url::parse("http://localhost:1").unwrap(), "b", "i", TransportKind::Http);
        Client(Arc::new(ClientInner {
            config,
            ref_counter: Arc::new(AtomicU64::new(0)),
            transport: RwLock::new(transport),
            batch_counter: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            on_downstream: None,
            last_batch: std::sync::Mutex::new(None),
        }))
    }

    #[tokio::test]
    async fn successful_item_decodes_to_encoded_value() {
        let response = BatchResponse {
            request_id: "0".to_string(),
            results: vec![BatchItemResult {
                index: 0,
                status: BatchItemStatus::Success,
                result: Some(serde_json::json!({ "root": encode_value(&Value::Number(5.0)), "objects": [] })),
            }],
        };
        let client = test_client(Arc::new(MockTransport::new(Ok(response))));

        let handle = client.root("counter");
        let result = client.resolve(handle).await.unwrap();
        assert_eq!(result.root, Value::Number(5.0));
    }

    #[tokio::test]
    async fn failed_item_becomes_remote_error() {
        let response = BatchResponse {
            request_id: "0".to_string(),
            results: vec![BatchItemResult {
                index: 0,
                status: BatchItemStatus::Failed {
                    code: "RPC-R001".to_string(),
                    name: "Error".to_string(),
                    message: "no such property".to_string(),
                    stack: None,
                    cause: None,
                    custom: Vec::new(),
                },
                result: None,
            }],
        };
        let client = test_client(Arc::new(MockTransport::new(Ok(response))));

        let err = client.resolve(client.root("missing")).await.unwrap_err();
        match err {
            ClientError::Remote { code, message, .. } => {
                assert_eq!(code, "RPC-R001");
                assert_eq!(message, "no such property");
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_item_preserves_custom_error_properties() {
        let response = BatchResponse {
            request_id: "0".to_string(),
            results: vec![BatchItemResult {
                index: 0,
                status: BatchItemStatus::Failed {
                    code: "RPC-U001".to_string(),
                    name: "Error".to_string(),
                    message: "nope".to_string(),
                    stack: None,
                    cause: None,
                    custom: vec![
                        ("code".to_string(), serde_json::json!("E_NOPE")),
                        ("statusCode".to_string(), serde_json::json!(409)),
                        ("metadata".to_string(), serde_json::json!({"retryable": false})),
                    ],
                },
                result: None,
            }],
        };
        let client = test_client(Arc::new(MockTransport::new(Ok(response))));

        let err = client.resolve(client.root("throwError")).await.unwrap_err();
        match err {
            ClientError::Remote { custom, .. } => {
                assert_eq!(
                    custom,
                    vec![
                        ("code".to_string(), serde_json::json!("E_NOPE")),
                        ("statusCode".to_string(), serde_json::json!(409)),
                        ("metadata".to_string(), serde_json::json!({"retryable": false})),
                    ]
                );
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skipped_item_becomes_skipped_error() {
        let response = BatchResponse {
            request_id: "0".to_string(),
            results: vec![BatchItemResult {
                index: 0,
                status: BatchItemStatus::Skipped {
                    reason: "earlier chain in batch was malformed".to_string(),
                },
                result: None,
            }],
        };
        let client = test_client(Arc::new(MockTransport::new(Ok(response))));

        let err = client.resolve(client.root("x")).await.unwrap_err();
        assert!(matches!(err, ClientError::Skipped { .. }));
    }

    #[tokio::test]
    async fn chain_exceeding_depth_limit_is_rejected_without_touching_transport() {
        let transport = Arc::new(MockTransport::new(Ok(BatchResponse {
            request_id: "0".to_string(),
            results: vec![],
        })));
        let mut client = test_client(transport.clone());
        Arc::get_mut(&mut client.0).unwrap().config.limits = ValidationLimits { max_depth: 1, max_args: 100 };

        let handle = client.root("counter").get("deeper");
        let err = client.resolve(handle).await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc(RpcError::Validation(_))));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn batch_closure_flushes_registered_handles_as_one_request() {
        let response = BatchResponse {
            request_id: "0".to_string(),
            results: vec![
                BatchItemResult {
                    index: 0,
                    status: BatchItemStatus::Success,
                    result: Some(serde_json::json!({ "root": encode_value(&Value::Number(1.0)), "objects": [] })),
                },
                BatchItemResult {
                    index: 1,
                    status: BatchItemStatus::Success,
                    result: Some(serde_json::json!({ "root": encode_value(&Value::Number(2.0)), "objects": [] })),
                },
            ],
        };
        let transport = Arc::new(MockTransport::new(Ok(response)));
        let client = test_client(transport.clone());

        let first = client.root("a");
        let second = client.root("b");
        let results = client
            .batch(|scope| {
                scope.add(first);
                scope.add(second);
            })
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().root, Value::Number(1.0));
        assert_eq!(results[1].as_ref().unwrap().root, Value::Number(2.0));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn inspect_mode_records_batch_without_touching_transport() {
        let transport = Arc::new(MockTransport::new(Ok(BatchResponse {
            request_id: "0".to_string(),
            results: vec![],
        })));
        let mut client = test_client(transport.clone());
        Arc::get_mut(&mut client.0).unwrap().config.inspect_mode = true;

        let handle = client.root("counter").get("increment").apply(vec![]);
        let err = client.resolve(handle).await.unwrap_err();

        assert!(matches!(err, ClientError::Skipped { .. }));
        assert_eq!(transport.calls.load(Ordering::Relaxed), 0);
        let recorded = client.last_batch().expect("inspect mode records the flushed batch");
        assert_eq!(recorded.chains.len(), 1);
    }

    #[tokio::test]
    async fn dispose_marks_client_disposed_and_tears_down_transport() {
        let transport = Arc::new(MockTransport::new(Ok(BatchResponse {
            request_id: "0".to_string(),
            results: vec![],
        })));
        let client = test_client(transport.clone());

        client.dispose().await;

        assert!(transport.disposed.load(Ordering::Relaxed));
        assert!(client.0.disposed.load(Ordering::Relaxed));
    }
}
