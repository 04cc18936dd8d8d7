// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-transport
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The HTTP + WebSocket transport: recognizes the two route shapes
//! [`chainrpc_router`] defines, hands matching requests to
//! [`chainrpc_executor::execute_batch`], and maintains the tag→socket
//! registry server code uses to push unsolicited downstream messages.
//!
//! [`build_router`] is the `wrap(class)` equivalent — it composes the two
//! RPC routes ahead of whatever the host application serves elsewhere.
//! [`try_handle_http`] and [`try_handle_ws_message`] are the
//! `handleRpcRequest`/`handleRpcMessage` equivalents: both resolve into
//! `None` when the request names a binding/instance this server has never
//! heard of, the "not an RPC frame, fall through" sentinel.

mod middleware;
mod registry;

pub use middleware::{CorsConfig, RequestId, RequestLogger, request_id_middleware};

use axum::middleware::from_fn;
pub use registry::{DownstreamRegistry, InMemoryResolver, TargetResolver};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path as AxPath, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chainrpc_codec::{BatchItemStatus, BatchRequest, BatchResponse};
use chainrpc_core::ReplayTarget;
use chainrpc_router::RouteConfig;
use chainrpc_validate::ValidationLimits;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Heartbeat request text the WebSocket side auto-responds to, matching the
/// durable-instance side's preconfigured ping/pong pair.
pub const HEARTBEAT_PING: &str = "auto-response ping";
/// Heartbeat response text paired with [`HEARTBEAT_PING`].
pub const HEARTBEAT_PONG: &str = "auto-response pong";

/// Shared state behind every route [`build_router`] wires up.
pub struct ServerState {
    /// Resolves a `(binding, instance)` pair to the durable object replaying
    /// its chains. `None` means this server doesn't host that instance.
    pub resolver: Arc<dyn TargetResolver>,
    /// Route prefix and shape recognition.
    pub route_config: RouteConfig,
    /// Depth/argument-count limits enforced on every chain before replay.
    pub limits: ValidationLimits,
    /// Tag→socket registry for server-initiated downstream pushes.
    pub downstream: DownstreamRegistry,
    /// CORS policy applied to every route `build_router` wires up. `None`
    /// (the default) applies none — an embedding application with its own
    /// CORS layer further out in its routing stack doesn't need a second.
    pub cors: Option<CorsConfig>,
}

impl ServerState {
    /// Construct state with the given resolver, using default route prefix
    /// and validation limits.
    #[must_use]
    pub fn new(resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            resolver,
            route_config: RouteConfig::default(),
            limits: ValidationLimits::default(),
            downstream: DownstreamRegistry::new(),
            cors: None,
        }
    }

    /// Push `payload` to every currently-connected socket tagged with one of
    /// `tags`. Returns how many sockets actually received it.
    pub fn send_downstream(&self, tags: &[String], payload: &chainrpc_core::Encoded) -> usize {
        let envelope = json!({
            "type": "downstream",
            "payload": chainrpc_codec::encode_encoded(payload),
        });
        self.downstream.broadcast(tags, envelope.to_string())
    }
}

/// Build the Axum router wiring `POST {prefix}/{binding}/{instance}/call`
/// and `GET {prefix}/{binding}/{instance}` (WebSocket upgrade) against
/// `state`. A host application nests this under its own router for
/// everything else.
#[must_use]
pub fn build_router(state: Arc<ServerState>) -> Router {
    let prefix = &state.route_config.prefix;
    let call_path = format!("/{prefix}/{{binding}}/{{instance}}/call");
    let upgrade_path = format!("/{prefix}/{{binding}}/{{instance}}");
    let cors = state.cors.clone();

    let mut router = Router::new()
        .route(&call_path, post(handle_call))
        .route(&upgrade_path, get(handle_upgrade))
        .with_state(state)
        .layer(from_fn(RequestLogger::layer))
        .layer(from_fn(request_id_middleware));

    if let Some(cors) = cors {
        router = router.layer(cors.to_cors_layer());
    }
    router
}

async fn handle_call(
    State(state): State<Arc<ServerState>>,
    AxPath((binding, instance)): AxPath<(String, String)>,
    body: Bytes,
) -> Response {
    match try_handle_http(&state, &binding, &instance, &body).await {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown binding or instance").into_response(),
    }
}

/// Replay a raw HTTP POST body against the instance named by
/// `binding`/`instance`.
///
/// Returns `None` if `resolver` does not know that binding/instance —
/// callers should treat that as "not an RPC request for us" and fall
/// through to their own routing. A malformed body for a *known* instance is
/// a genuine client error, not a fall-through case, and comes back as
/// `Some((400, ..))`.
pub async fn try_handle_http(
    state: &ServerState,
    binding: &str,
    instance: &str,
    body: &[u8],
) -> Option<(StatusCode, serde_json::Value)> {
    let target = state.resolver.resolve(binding, instance)?;

    let request: BatchRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(err) => {
            return Some((
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("malformed batch request: {err}") }),
            ));
        }
    };

    let response = chainrpc_executor::execute_batch(target.as_ref(), state.limits, &request).await;
    let status = if any_failed(&response) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Some((status, serde_json::to_value(response).unwrap_or(json!({}))))
}

fn any_failed(response: &BatchResponse) -> bool {
    response
        .results
        .iter()
        .any(|r| matches!(r.status, BatchItemStatus::Failed { .. }))
}

async fn handle_upgrade(
    State(state): State<Arc<ServerState>>,
    AxPath((binding, instance)): AxPath<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(target) = state.resolver.resolve(&binding, &instance) else {
        return (StatusCode::NOT_FOUND, "unknown binding or instance").into_response();
    };
    let tag = params.get("clientId").cloned();
    ws.on_upgrade(move |socket| handle_socket(socket, state, target, tag, binding, instance))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<ServerState>,
    target: Arc<dyn ReplayTarget>,
    tag: Option<String>,
    binding: String,
    instance: String,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    if let Some(tag) = &tag {
        state.downstream.register(tag, tx.clone());
    }

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match try_handle_ws_message(&state, target.as_ref(), &text).await {
                Some(reply) => {
                    if tx.send(Message::Text(reply.into())).is_err() {
                        break;
                    }
                }
                None => warn!("ignoring non-rpc websocket text frame"),
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    if let Some(tag) = &tag {
        state.downstream.deregister(tag, &tx);
    }
    send_task.abort();
    info!(binding = %binding, instance = %instance, "websocket connection closed");
}

/// Replay one inbound WebSocket text frame against `target`.
///
/// Returns `None` for text that is neither the heartbeat ping nor valid
/// JSON [`BatchRequest`] — binary frames and unrecognized text pass through
/// to the caller's own handling, per the transport's "not RPC" sentinel.
pub async fn try_handle_ws_message(
    state: &ServerState,
    target: &dyn ReplayTarget,
    text: &str,
) -> Option<String> {
    if text == HEARTBEAT_PING {
        return Some(HEARTBEAT_PONG.to_string());
    }

    let request: BatchRequest = serde_json::from_str(text).ok()?;
    let response = chainrpc_executor::execute_batch(target, state.limits, &request).await;
    serde_json::to_string(&response).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainrpc_core::value::{Encoded, FunctionNode, Graph, Node, Value};
    use chainrpc_error::RpcError;
    use futures::{SinkExt as _, StreamExt as _};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Minimal single-method [`ReplayTarget`] double, just enough to drive
    /// one round trip through the HTTP and WebSocket routes.
    struct Echo;

    #[async_trait]
    impl ReplayTarget for Echo {
        async fn get(&self, key: &str) -> Result<Encoded, RpcError> {
            if key == "ping" {
                let mut graph = Graph::new();
                let r = graph.push(Node::Function(FunctionNode { name: "ping".into() }));
                Ok(Encoded { root: Value::Ref(r), graph })
            } else {
                Ok(Encoded::scalar(Value::Undefined))
            }
        }

        async fn call(&self, method: &str, _args: Vec<Value>, _graph: &Graph) -> Result<Encoded, RpcError> {
            match method {
                "ping" => Ok(Encoded::scalar(Value::String("pong".into()))),
                other => Err(chainrpc_error::ReplayError::NoSuchProperty { key: other.to_string() }.into()),
            }
        }

        fn property_names(&self) -> Vec<String> {
            vec![]
        }

        fn method_names(&self) -> Vec<String> {
            vec!["ping".into()]
        }
    }

    fn test_router() -> Router {
        let resolver = InMemoryResolver::new();
        resolver.register("Echo", "default", Arc::new(Echo));
        build_router(Arc::new(ServerState::new(Arc::new(resolver))))
    }

    fn ping_batch() -> serde_json::Value {
        json!({
            "id": "0",
            "chains": [
                chainrpc_codec::encode_chain(
                    &chainrpc_core::OperationChain::new()
                        .then(chainrpc_core::Operation::get("ping"))
                        .then(chainrpc_core::Operation::apply(vec![])),
                )
            ],
        })
    }

    #[tokio::test]
    async fn get_on_the_call_route_is_method_not_allowed() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/__rpc/Echo/default/call")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unmapped_path_is_not_found() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/totally/unrelated/path")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_binding_falls_through_to_not_found() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/__rpc/Ghost/default/call")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(ping_batch().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn successful_call_round_trips_over_http() {
        let response = test_router()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/__rpc/Echo/default/call")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(ping_batch().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: BatchResponse = serde_json::from_slice(&body).unwrap();
        assert!(matches!(parsed.results[0].status, BatchItemStatus::Success));
    }

    #[tokio::test]
    async fn websocket_round_trip_replays_a_batch_and_answers_heartbeat() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = test_router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/__rpc/Echo/default"))
            .await
            .unwrap();

        ws.send(tokio_tungstenite::tungstenite::Message::text(ping_batch().to_string()))
            .await
            .unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        let parsed: BatchResponse = serde_json::from_str(&reply.into_text().unwrap()).unwrap();
        assert!(matches!(parsed.results[0].status, BatchItemStatus::Success));

        ws.send(tokio_tungstenite::tungstenite::Message::text(HEARTBEAT_PING))
            .await
            .unwrap();
        let pong = ws.next().await.unwrap().unwrap();
        assert_eq!(pong.into_text().unwrap(), HEARTBEAT_PONG);
    }
}
