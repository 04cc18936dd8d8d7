//! Drives a real `chainrpc-client` `Client` against a real `axum` server
//! built from `chainrpc-transport`, over an actual loopback TCP socket —
//! the one test in this workspace that exercises every layer together
//! rather than one crate's seam in isolation.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chainrpc_client::{ArgValue, Client, ClientConfig, TransportKind};
use chainrpc_core::value::{Encoded, FunctionNode, Graph, Node, Value};
use chainrpc_core::ReplayTarget;
use chainrpc_error::{ReplayError, RpcError, UserError};
use chainrpc_transport::{InMemoryResolver, ServerState};

struct Counter {
    value: Mutex<f64>,
}

impl Counter {
    fn new() -> Self {
        Self { value: Mutex::new(0.0) }
    }
}

#[async_trait]
impl ReplayTarget for Counter {
    async fn get(&self, key: &str) -> Result<Encoded, RpcError> {
        match key {
            "increment" | "add" | "throwError" => {
                let mut graph = Graph::new();
                let r = graph.push(Node::Function(FunctionNode { name: key.to_string() }));
                Ok(Encoded { root: Value::Ref(r), graph })
            }
            _ => Ok(Encoded::scalar(Value::Undefined)),
        }
    }

    async fn call(&self, method: &str, args: Vec<Value>, _graph: &Graph) -> Result<Encoded, RpcError> {
        match method {
            "increment" => {
                let mut v = self.value.lock().unwrap();
                *v += 1.0;
                Ok(Encoded::scalar(Value::Number(*v)))
            }
            "add" => {
                let sum: f64 = args
                    .iter()
                    .map(|a| match a {
                        Value::Number(n) => *n,
                        _ => 0.0,
                    })
                    .sum();
                Ok(Encoded::scalar(Value::Number(sum)))
            }
            "throwError" => {
                let message = match args.first() {
                    Some(Value::String(s)) => s.clone(),
                    _ => "boom".to_string(),
                };
                let mut err = UserError::new("Error", message);
                err.custom = vec![
                    ("code".to_string(), serde_json::json!("E_BOOM")),
                    ("statusCode".to_string(), serde_json::json!(409)),
                    ("metadata".to_string(), serde_json::json!({"retryable": false})),
                ];
                Err(err.into())
            }
            other => Err(ReplayError::NoSuchProperty { key: other.to_string() }.into()),
        }
    }

    fn property_names(&self) -> Vec<String> {
        vec![]
    }

    fn method_names(&self) -> Vec<String> {
        vec!["increment".into(), "add".into(), "throwError".into()]
    }
}

async fn spawn_server() -> url::Url {
    let resolver = InMemoryResolver::new();
    resolver.register("Counter", "default", Arc::new(Counter::new()));
    let state = Arc::new(ServerState::new(Arc::new(resolver)));
    let router = chainrpc_transport::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    url::Url::parse(&format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn increment_round_trips_over_http() {
    let base_url = spawn_server().await;
    let config = ClientConfig::new(base_url, "Counter", "default", TransportKind::Http);
    let client = Client::connect(config).unwrap();

    let handle = client.root("increment").apply(vec![]);
    let result = client.resolve(handle).await.unwrap();
    assert_eq!(result.root, Value::Number(1.0));
}

#[tokio::test]
async fn promise_pipelined_add_resolves_in_one_round_trip() {
    let base_url = spawn_server().await;
    let config = ClientConfig::new(base_url, "Counter", "default", TransportKind::Http);
    let client = Client::connect(config).unwrap();

    let incremented = client.root("increment").apply(vec![]);
    let added = client.root("add").apply(vec![ArgValue::Handle(incremented), ArgValue::from(10.0)]);

    let result = client.resolve(added).await.unwrap();
    assert_eq!(result.root, Value::Number(11.0));
}

#[tokio::test]
async fn server_side_throw_surfaces_as_remote_error() {
    let base_url = spawn_server().await;
    let config = ClientConfig::new(base_url, "Counter", "default", TransportKind::Http);
    let client = Client::connect(config).unwrap();

    let handle = client.root("throwError").apply(vec![ArgValue::from("nope")]);
    let err = client.resolve(handle).await.unwrap_err();
    match err {
        chainrpc_client::ClientError::Remote { message, custom, .. } => {
            assert_eq!(message, "nope");
            // Scenario 5: a thrown error's custom enumerable properties
            // (code, statusCode, metadata) survive the round trip.
            let as_map: std::collections::HashMap<_, _> = custom.into_iter().collect();
            assert_eq!(as_map.get("code"), Some(&serde_json::json!("E_BOOM")));
            assert_eq!(as_map.get("statusCode"), Some(&serde_json::json!(409)));
            assert_eq!(as_map.get("metadata"), Some(&serde_json::json!({"retryable": false})));
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn batch_flushes_independent_handles_in_one_request() {
    let base_url = spawn_server().await;
    let config = ClientConfig::new(base_url, "Counter", "default", TransportKind::Http);
    let client = Client::connect(config).unwrap();

    let first = client.root("increment").apply(vec![]);
    let second = client.root("add").apply(vec![ArgValue::from(2.0), ArgValue::from(3.0)]);

    let results = client
        .batch(|scope| {
            scope.add(first);
            scope.add(second);
        })
        .await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().root, Value::Number(1.0));
    assert_eq!(results[1].as_ref().unwrap().root, Value::Number(5.0));
}

#[tokio::test]
async fn client_reconnects_transparently_after_dispose() {
    let base_url = spawn_server().await;
    let config = ClientConfig::new(base_url, "Counter", "default", TransportKind::Http);
    let client = Client::connect(config).unwrap();

    let before = client.resolve(client.root("increment").apply(vec![])).await.unwrap();
    assert_eq!(before.root, Value::Number(1.0));

    client.dispose().await;

    let after = client.resolve(client.root("increment").apply(vec![])).await.unwrap();
    assert_eq!(after.root, Value::Number(2.0));
}
