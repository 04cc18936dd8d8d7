//! WebSocket transport: a persistent connection multiplexing every flushed
//! batch, with a connecting-state send queue (bounded by a byte budget,
//! per spec §2's "client-queued sends"), a heartbeat the durable-instance
//! side auto-responds to, and downstream-push dispatch (spec §2 reverse
//! path).
//!
//! The connection itself lives on a dedicated background task; the
//! [`WebSocketTransport`] handle just posts commands to it. This mirrors a
//! browser `WebSocket`'s "construct now, connect in the background, queue
//! sends until open" behavior rather than making `connect()` an async call
//! that blocks on the handshake.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chainrpc_codec::{BatchRequest, BatchResponse};
use chainrpc_error::{RpcError, SerializationError, TransportError};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;

use super::{ClientTransport, DownstreamCallback, HEARTBEAT_PING, HEARTBEAT_PONG};
use crate::config::ClientConfig;

/// Interval between outbound heartbeat pings on an open connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

enum Command {
    Send {
        text: String,
        responder: oneshot::Sender<Result<BatchResponse, RpcError>>,
    },
    Dispose,
}

/// A WebSocket-backed [`ClientTransport`]. Construction never blocks on the
/// handshake; sends issued before the connection is open are queued up to
/// `config.queue_budget_bytes`, after which further sends fail fast with
/// [`TransportError::QueueOverflow`] rather than growing unbounded.
pub struct WebSocketTransport {
    commands: mpsc::UnboundedSender<Command>,
    disposed: Arc<AtomicBool>,
}

impl WebSocketTransport {
    /// Begin connecting to `config`'s upgrade route in the background.
    ///
    /// `on_downstream`, if present, is invoked (off the caller's task) for
    /// every `{"type":"downstream",...}` envelope the connection receives
    /// outside of any batch response.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if `config.base_url` cannot be
    /// turned into a WebSocket upgrade request (malformed URL, invalid
    /// header value among `config.headers`/`config.additional_protocols`).
    pub fn connect(config: &ClientConfig, on_downstream: Option<DownstreamCallback>) -> Result<Self, RpcError> {
        let request = build_request(config)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let disposed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_connection(
            request,
            config.queue_budget_bytes,
            commands_rx,
            on_downstream,
            Arc::clone(&disposed),
        ));

        Ok(Self {
            commands: commands_tx,
            disposed,
        })
    }
}

#[async_trait]
impl ClientTransport for WebSocketTransport {
    async fn send_batch(&self, request: &BatchRequest) -> Result<BatchResponse, RpcError> {
        if self.disposed.load(Ordering::Relaxed) {
            return Err(RpcError::Transport(TransportError::Disposed));
        }

        let text = serde_json::to_string(request).map_err(|err| {
            RpcError::Serialization(SerializationError::UnsupportedValue {
                kind: format!("batch request does not serialize: {err}"),
            })
        })?;

        let (responder, receiver) = oneshot::channel();
        self.commands
            .send(Command::Send { text, responder })
            .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;

        receiver.await.map_err(|_| RpcError::Transport(TransportError::Disconnected))?
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Relaxed);
        let _ = self.commands.send(Command::Dispose);
    }
}

fn build_request(
    config: &ClientConfig,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, RpcError> {
    let mut url: Url = config
        .base_url
        .join(&config.upgrade_path())
        .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
    let ws_scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    };
    url.set_scheme(ws_scheme).map_err(|()| RpcError::Transport(TransportError::Disconnected))?;
    if let Some(client_id) = &config.client_id {
        url.query_pairs_mut().append_pair("clientId", client_id);
    }

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|_| RpcError::Transport(TransportError::Disconnected))?;

    if !config.additional_protocols.is_empty() {
        let joined = config.additional_protocols.join(", ");
        let value = HeaderValue::from_str(&joined).map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
        request.headers_mut().insert("sec-websocket-protocol", value);
    }
    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| RpcError::Transport(TransportError::Disconnected))?;
        request.headers_mut().insert(header_name, header_value);
    }

    Ok(request)
}

/// Extract a `BatchRequest`'s `id` field from its already-serialized text,
/// without a full typed parse, so the connecting-state queue can key
/// pending responders before the connection exists to send anything.
fn extract_id(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

fn fail_all(queue: VecDeque<(String, oneshot::Sender<Result<BatchResponse, RpcError>>)>, error: TransportError) {
    for (_, responder) in queue {
        let _ = responder.send(Err(RpcError::Transport(error.clone())));
    }
}

async fn run_connection(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    budget: usize,
    mut commands_rx: mpsc::UnboundedReceiver<Command>,
    on_downstream: Option<DownstreamCallback>,
    disposed: Arc<AtomicBool>,
) {
    let mut queue: VecDeque<(String, oneshot::Sender<Result<BatchResponse, RpcError>>)> = VecDeque::new();
    let mut queued_bytes = 0usize;

    let connect_fut = connect_async(request);
    tokio::pin!(connect_fut);

    let stream = loop {
        tokio::select! {
            result = &mut connect_fut => {
                match result {
                    Ok((stream, _response)) => break stream,
                    Err(_) => {
                        fail_all(queue, TransportError::Disconnected);
                        disposed.store(true, Ordering::Relaxed);
                        return;
                    }
                }
            }
            command = commands_rx.recv() => {
                match command {
                    Some(Command::Send { text, responder }) => {
                        let len = text.len();
                        if queued_bytes + len > budget {
                            let _ = responder.send(Err(RpcError::Transport(TransportError::QueueOverflow {
                                pending: queued_bytes,
                                budget,
                            })));
                        } else {
                            queued_bytes += len;
                            queue.push_back((text, responder));
                        }
                    }
                    Some(Command::Dispose) | None => {
                        fail_all(queue, TransportError::Disposed);
                        disposed.store(true, Ordering::Relaxed);
                        return;
                    }
                }
            }
        }
    };

    let (mut sink, mut source) = stream.split();
    let mut pending: HashMap<String, oneshot::Sender<Result<BatchResponse, RpcError>>> = HashMap::new();

    for (text, responder) in queue.drain(..) {
        if let Some(id) = extract_id(&text) {
            pending.insert(id, responder);
        }
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if sink.send(Message::Text(HEARTBEAT_PING.into())).await.is_err() {
                    break;
                }
            }
            command = commands_rx.recv() => {
                match command {
                    Some(Command::Send { text, responder }) => {
                        match extract_id(&text) {
                            Some(id) => {
                                pending.insert(id, responder);
                            }
                            None => {
                                let _ = responder.send(Err(RpcError::Serialization(SerializationError::UnsupportedValue {
                                    kind: "batch request missing id".to_string(),
                                })));
                                continue;
                            }
                        }
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Command::Dispose) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.to_string();
                        if text == HEARTBEAT_PONG {
                            continue;
                        }
                        if let Ok(envelope) = serde_json::from_str::<serde_json::Value>(&text) {
                            if envelope.get("type").and_then(serde_json::Value::as_str) == Some("downstream") {
                                if let (Some(cb), Some(payload)) = (&on_downstream, envelope.get("payload").cloned()) {
                                    cb(payload);
                                }
                                continue;
                            }
                        }
                        if let Ok(response) = serde_json::from_str::<BatchResponse>(&text) {
                            if let Some(responder) = pending.remove(&response.request_id) {
                                let _ = responder.send(Ok(response));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    disposed.store(true, Ordering::Relaxed);
    for (_, responder) in pending.drain() {
        let _ = responder.send(Err(RpcError::Transport(TransportError::Disconnected)));
    }
}
