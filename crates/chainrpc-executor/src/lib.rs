// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-executor
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The server-side interpreter: decode a batch, validate each chain's shape,
//! resolve nested-operation arguments, walk Get/Apply steps against a
//! [`ReplayTarget`], post-process the result so returned functions become
//! re-callable [`chainrpc_core::value::Node::RemoteFunction`]s, and encode
//! the response. [`execute_batch`] is the single entry point; everything
//! else in this crate exists to support it.

use chainrpc_codec::{BatchItemResult, BatchItemStatus, BatchRequest, BatchResponse, decode_chain, encode_encoded};
use chainrpc_core::value::{Encoded, Graph, Node, NodeRef, Value};
use chainrpc_core::{Operation, OperationChain, RemoteFunctionMarker, ReplayTarget};
use chainrpc_error::{ReplayError, RpcError};
use chainrpc_validate::ValidationLimits;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Reserved key that triggers `__asObject` introspection instead of an
/// ordinary property read, when it is the chain's final `Get`.
const AS_OBJECT_KEY: &str = "__asObject";

/// How deep [`introspect`] descends into nested plain objects, per the
/// "exactly one level" reading of the ambiguous source behavior.
const AS_OBJECT_DEPTH: u32 = 1;

/// Reserved key that, as the chain's very first `Get`, pivots replay into
/// the target's env registry instead of its root (spec §4.2).
const ENV_PIVOT_KEY: &str = "env";

/// The chain-replay cursor: either the target's root (before any `Get`) or a
/// concrete decoded value produced by a prior step.
#[derive(Debug, Clone)]
enum ChainValue {
    Root,
    Value(Encoded),
}

/// Replay every chain in `request` against `target`, in order, and return
/// the matching [`BatchResponse`]. Per-chain failures never abort the batch
/// — each chain gets its own [`BatchItemStatus`], mirroring the propagation
/// policy that a failed entry doesn't prevent its siblings from replaying.
///
/// `refId` aliasing is scoped to this single batch: the memo is created
/// fresh here and dropped when this call returns, so the "same" proxy
/// embedded across two different batches executes independently.
pub async fn execute_batch(
    target: &dyn ReplayTarget,
    limits: ValidationLimits,
    request: &BatchRequest,
) -> BatchResponse {
    let mut memo: HashMap<u64, Encoded> = HashMap::new();
    let mut results = Vec::with_capacity(request.chains.len());

    for (index, wire) in request.chains.iter().enumerate() {
        let status = match replay_one(target, limits, wire, &mut memo).await {
            Ok(result) => BatchItemResult {
                index,
                status: BatchItemStatus::Success,
                result: Some(result),
            },
            Err(err) => {
                warn!(index, code = err.code(), error = %err, "chain replay failed");
                BatchItemResult {
                    index,
                    status: BatchItemStatus::failed(err.to_payload()),
                    result: None,
                }
            }
        };
        results.push(status);
    }

    BatchResponse {
        request_id: request.id.clone(),
        results,
    }
}

async fn replay_one(
    target: &dyn ReplayTarget,
    limits: ValidationLimits,
    wire: &serde_json::Value,
    memo: &mut HashMap<u64, Encoded>,
) -> Result<serde_json::Value, RpcError> {
    let chain = decode_chain(wire)?;
    chain.validate_shape(limits.max_depth, limits.max_args)?;
    let result = replay_chain(target, &chain, memo).await?;
    Ok(encode_encoded(&result))
}

/// Replay a single [`OperationChain`] against `target`, resolving any
/// nested-operation arguments through `memo` as they're encountered.
///
/// Boxed because argument resolution recurses back into this function for
/// embedded proxy chains — plain `async fn` recursion doesn't type-check
/// without this indirection.
fn replay_chain<'a>(
    target: &'a dyn ReplayTarget,
    chain: &'a OperationChain,
    memo: &'a mut HashMap<u64, Encoded>,
) -> BoxFuture<'a, Result<Encoded, RpcError>> {
    Box::pin(async move {
        let mut current = ChainValue::Root;
        let mut i = 0;
        while i < chain.operations.len() {
            if let Operation::Get { key } = &chain.operations[i] {
                if key == AS_OBJECT_KEY
                    && i + 1 == chain.operations.len() - 1
                    && matches!(chain.operations.get(i + 1), Some(Operation::Apply { .. }))
                {
                    let introspected = introspect(target, &current).await?;
                    current = ChainValue::Value(introspected);
                    i += 2;
                    continue;
                }

                if i == 0 && key == ENV_PIVOT_KEY {
                    if let Some(encoded) = target.env(ENV_PIVOT_KEY).await? {
                        current = ChainValue::Value(encoded);
                        i += 1;
                        continue;
                    }
                }
            }

            current = match &chain.operations[i] {
                Operation::Get { key } => step_get(target, current, key).await?,
                Operation::Apply { args } => step_apply(target, current, args, &chain.graph, memo).await?,
            };
            i += 1;
        }

        let encoded = match current {
            ChainValue::Value(encoded) => encoded,
            ChainValue::Root => Encoded::scalar(Value::Undefined),
        };
        Ok(post_process(encoded, chain))
    })
}

async fn step_get(target: &dyn ReplayTarget, current: ChainValue, key: &str) -> Result<ChainValue, RpcError> {
    match current {
        ChainValue::Root => {
            let encoded = target.get(key).await?;
            Ok(ChainValue::Value(encoded))
        }
        ChainValue::Value(encoded) => {
            let field = read_property(&encoded, key);
            Ok(ChainValue::Value(Encoded {
                root: field,
                graph: encoded.graph,
            }))
        }
    }
}

/// Reads a property off an already-decoded value. A non-existent property
/// (or a property read on anything that isn't an object/array) yields
/// `undefined` rather than an error — only a subsequent `Apply` on that
/// `undefined` fails, per replay semantics.
fn read_property(encoded: &Encoded, key: &str) -> Value {
    let Value::Ref(r) = &encoded.root else {
        return Value::Undefined;
    };
    match encoded.graph.get(*r) {
        Some(Node::Object(fields)) => fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Undefined),
        Some(Node::Array(items)) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    }
}

async fn step_apply(
    target: &dyn ReplayTarget,
    current: ChainValue,
    args: &[Value],
    local_graph: &Graph,
    memo: &mut HashMap<u64, Encoded>,
) -> Result<ChainValue, RpcError> {
    let encoded = match &current {
        ChainValue::Root => return Err(ReplayError::NotAFunction.into()),
        ChainValue::Value(encoded) => encoded,
    };
    let name = function_name(encoded).ok_or(ReplayError::NotAFunction)?;

    let mut merged_graph = local_graph.clone();
    let mut resolved_args = Vec::with_capacity(args.len());
    for arg in args {
        resolved_args.push(resolve_argument(target, arg, &mut merged_graph, memo).await?);
    }

    let result = target.call(&name, resolved_args, &merged_graph).await?;
    Ok(ChainValue::Value(result))
}

/// Returns the dispatch name if `encoded`'s root resolves to a callable
/// member, `None` otherwise (including for primitives, `undefined`, and
/// non-function nodes).
fn function_name(encoded: &Encoded) -> Option<String> {
    match &encoded.root {
        Value::Ref(r) => match encoded.graph.get(*r) {
            Some(Node::Function(f)) => Some(f.name.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Resolves one `Apply` argument: a plain value passes through unchanged
/// (any `Ref` it carries already resolves against `merged_graph`, since that
/// graph starts as a clone of the chain's own argument graph); a
/// [`Value::Nested`] marker is replayed (or fetched from `memo` if it's a
/// bare alias) and its own graph spliced into `merged_graph` with its
/// indices shifted to avoid collision.
async fn resolve_argument(
    target: &dyn ReplayTarget,
    value: &Value,
    merged_graph: &mut Graph,
    memo: &mut HashMap<u64, Encoded>,
) -> Result<Value, RpcError> {
    let Value::Nested(marker) = value else {
        return Ok(value.clone());
    };

    let resolved = match &marker.chain {
        Some(chain) => {
            let result = replay_chain(target, chain, memo).await?;
            memo.insert(marker.ref_id.0, result.clone());
            result
        }
        None => memo
            .get(&marker.ref_id.0)
            .cloned()
            .ok_or(ReplayError::UnresolvedReference {
                ref_id: marker.ref_id.0,
            })?,
    };

    let offset = merged_graph.len();
    for node in &resolved.graph.nodes {
        merged_graph.nodes.push(shift_node(node, offset));
    }
    Ok(shift_value(&resolved.root, offset))
}

fn shift_value(value: &Value, offset: usize) -> Value {
    match value {
        Value::Ref(NodeRef(i)) => Value::Ref(NodeRef(i + offset)),
        other => other.clone(),
    }
}

fn shift_node(node: &Node, offset: usize) -> Node {
    match node {
        Node::Array(items) => Node::Array(items.iter().map(|v| shift_value(v, offset)).collect()),
        Node::Object(fields) => Node::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), shift_value(v, offset)))
                .collect(),
        ),
        Node::Map(entries) => Node::Map(
            entries
                .iter()
                .map(|(k, v)| (shift_value(k, offset), shift_value(v, offset)))
                .collect(),
        ),
        Node::Set(items) => Node::Set(items.iter().map(|v| shift_value(v, offset)).collect()),
        other => other.clone(),
    }
}

/// Post-processing pass (spec step 5): any [`Node::Function`] reachable from
/// `encoded`'s root becomes a [`Node::RemoteFunction`] carrying the absolute
/// chain needed to reach it again — `chain` itself for a bare function
/// result, or `chain` extended with the Get path walked to find it for one
/// nested inside the returned object/array. Cycles are visited once. Other
/// built-in node types (Map, Set, Date, …) are left untouched.
fn post_process(encoded: Encoded, chain: &OperationChain) -> Encoded {
    let Encoded { root, mut graph } = encoded;
    let mut visited = HashSet::new();
    let mut targets = Vec::new();
    collect_functions(&root, &graph, Vec::new(), &mut visited, &mut targets);

    for (index, path) in targets {
        let name = match &graph.nodes[index] {
            Node::Function(f) => f.name.clone(),
            _ => continue,
        };
        let mut marker_chain = chain.clone();
        for key in &path {
            marker_chain = marker_chain.then(Operation::get(key.clone()));
        }
        graph.nodes[index] = Node::RemoteFunction(RemoteFunctionMarker::new(name, marker_chain));
    }

    Encoded { root, graph }
}

fn collect_functions(
    value: &Value,
    graph: &Graph,
    path: Vec<String>,
    visited: &mut HashSet<usize>,
    out: &mut Vec<(usize, Vec<String>)>,
) {
    let Value::Ref(NodeRef(i)) = value else {
        return;
    };
    if !visited.insert(*i) {
        return;
    }
    match graph.get(NodeRef(*i)) {
        Some(Node::Function(_)) => out.push((*i, path)),
        Some(Node::Object(fields)) => {
            for (key, v) in fields {
                let mut next = path.clone();
                next.push(key.clone());
                collect_functions(v, graph, next, visited, out);
            }
        }
        Some(Node::Array(items)) => {
            for (index, v) in items.iter().enumerate() {
                let mut next = path.clone();
                next.push(index.to_string());
                collect_functions(v, graph, next, visited, out);
            }
        }
        _ => {}
    }
}

/// `__asObject` introspection (spec §4.5): a shallow dictionary of own
/// enumerable properties plus every reachable method name, with methods
/// stringified as `"<name> [Function]"`. Nested plain objects recurse
/// exactly one level deep — their own nested objects are copied verbatim
/// rather than introspected further.
async fn introspect(target: &dyn ReplayTarget, current: &ChainValue) -> Result<Encoded, RpcError> {
    match current {
        ChainValue::Root => {
            let mut graph = Graph::new();
            let mut fields = Vec::new();
            for name in target.property_names() {
                let property = target.get(&name).await?;
                let offset = graph.len();
                for node in &property.graph.nodes {
                    graph.nodes.push(shift_node(node, offset));
                }
                fields.push((name, shift_value(&property.root, offset)));
            }
            for name in target.method_names() {
                fields.push((name.clone(), Value::String(format!("{name} [Function]"))));
            }
            let root = graph.push(Node::Object(fields));
            Ok(Encoded {
                root: Value::Ref(root),
                graph,
            })
        }
        ChainValue::Value(encoded) => {
            let mut out = Graph::new();
            let mut memo = HashMap::new();
            let root = introspect_value(&encoded.root, &encoded.graph, AS_OBJECT_DEPTH, &mut out, &mut memo);
            Ok(Encoded { root, graph: out })
        }
    }
}

fn introspect_value(
    value: &Value,
    graph: &Graph,
    depth_remaining: u32,
    out: &mut Graph,
    memo: &mut HashMap<usize, NodeRef>,
) -> Value {
    let Value::Ref(NodeRef(i)) = value else {
        return value.clone();
    };
    if let Some(&mapped) = memo.get(i) {
        return Value::Ref(mapped);
    }
    match graph.get(NodeRef(*i)) {
        Some(Node::Function(f)) => Value::String(format!("{} [Function]", f.name)),
        Some(Node::RemoteFunction(m)) => Value::String(format!("{} [Function]", m.name)),
        Some(Node::Object(fields)) if depth_remaining > 0 => {
            let placeholder = out.push(Node::Object(Vec::new()));
            memo.insert(*i, placeholder);
            let introspected: Vec<(String, Value)> = fields
                .iter()
                .map(|(k, v)| (k.clone(), introspect_value(v, graph, depth_remaining - 1, out, memo)))
                .collect();
            out.nodes[placeholder.0] = Node::Object(introspected);
            Value::Ref(placeholder)
        }
        Some(_) => copy_verbatim(NodeRef(*i), graph, out, memo),
        None => Value::Undefined,
    }
}

/// Deep-copies a reachable subgraph without any function conversion, used
/// once [`AS_OBJECT_DEPTH`] is exhausted: the source's own nested objects
/// are not introspected further, but they still need to land in `out`'s
/// node table rather than dangling as references into the original graph.
fn copy_verbatim(r: NodeRef, graph: &Graph, out: &mut Graph, memo: &mut HashMap<usize, NodeRef>) -> Value {
    if let Some(&mapped) = memo.get(&r.0) {
        return Value::Ref(mapped);
    }
    let Some(node) = graph.get(r) else {
        return Value::Undefined;
    };
    let placeholder = out.push(Node::Object(Vec::new()));
    memo.insert(r.0, placeholder);
    let copied = match node {
        Node::Array(items) => Node::Array(
            items
                .iter()
                .map(|v| copy_verbatim_value(v, graph, out, memo))
                .collect(),
        ),
        Node::Object(fields) => Node::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), copy_verbatim_value(v, graph, out, memo)))
                .collect(),
        ),
        Node::Map(entries) => Node::Map(
            entries
                .iter()
                .map(|(k, v)| {
                    (
                        copy_verbatim_value(k, graph, out, memo),
                        copy_verbatim_value(v, graph, out, memo),
                    )
                })
                .collect(),
        ),
        Node::Set(items) => Node::Set(
            items
                .iter()
                .map(|v| copy_verbatim_value(v, graph, out, memo))
                .collect(),
        ),
        other => other.clone(),
    };
    out.nodes[placeholder.0] = copied;
    Value::Ref(placeholder)
}

fn copy_verbatim_value(value: &Value, graph: &Graph, out: &mut Graph, memo: &mut HashMap<usize, NodeRef>) -> Value {
    match value {
        Value::Ref(r) => copy_verbatim(*r, graph, out, memo),
        other => other.clone(),
    }
}
