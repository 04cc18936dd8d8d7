//! [`ChainHandle`] is the `ProxyState` analogue described in spec §3: a
//! value-typed, `Arc`-shared recorder standing in for the transparent proxy
//! a dynamic-dispatch host language would use. Every `.get()`/`.apply()`
//! call constructs a *new* handle inheriting the parent's chain with one
//! more operation appended; the handle never mutates in place, so cloning a
//! handle shares identity (alias detection is `Arc` pointer identity, per
//! spec §4.3) while deriving a child never disturbs the parent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use chainrpc_core::value::{Encoded, Graph, Node, NodeRef, Value};
use chainrpc_core::{NestedOperationMarker, Operation, OperationChain, RefId};

use crate::client::ClientInner;

/// Reserved final `Get` that triggers `__asObject` introspection on the
/// server instead of an ordinary property read. Mirrors the constant of the
/// same name private to `chainrpc-executor`.
pub const AS_OBJECT_KEY: &str = "__asObject";

/// One argument position in a [`ChainHandle::apply`] call.
#[derive(Clone)]
pub enum ArgValue {
    /// A scalar or pre-encoded [`Value`]. Any [`chainrpc_core::value::Value::Ref`]
    /// it carries is assumed to resolve against the graph supplied alongside
    /// it — use [`ArgValue::Encoded`] rather than hand-building a dangling
    /// `Ref` this way.
    Value(Value),
    /// A complex literal value together with the graph its refs resolve
    /// against (e.g. an object or array built independently of any handle).
    /// Spliced into the new chain's own graph at `apply()` time.
    Encoded(Encoded),
    /// Another handle's result, pipelined in without a separate round trip.
    /// Recorded as a [`chainrpc_core::NestedOperationMarker`]; the first
    /// occurrence of a given handle within a flushed batch carries its full
    /// chain, later occurrences alias by `refId` (see [`crate::batch`]).
    Handle(ChainHandle),
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Encoded> for ArgValue {
    fn from(encoded: Encoded) -> Self {
        Self::Encoded(encoded)
    }
}

impl From<ChainHandle> for ArgValue {
    fn from(handle: ChainHandle) -> Self {
        Self::Handle(handle)
    }
}

impl From<f64> for ArgValue {
    fn from(n: f64) -> Self {
        Self::Value(Value::Number(n))
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        Self::Value(Value::Bool(b))
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        Self::Value(Value::string(s))
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        Self::Value(Value::String(s))
    }
}

/// The recorder behind a [`ChainHandle`]. Never exposed directly — always
/// reached through the `Arc` a handle wraps, so two handles sharing one
/// `Arc` (via [`Clone`]) are the *same* proxy, and two handles built from
/// identical operations but separate `apply()` calls are deliberately not.
pub(crate) struct ChainHandleInner {
    pub(crate) chain: OperationChain,
    pub(crate) parent: Option<ChainHandle>,
    pub(crate) depth: usize,
    ref_id: OnceLock<RefId>,
    ref_counter: Arc<AtomicU64>,
    pub(crate) client: Weak<ClientInner>,
}

/// A recorder standing in for one step of a chain under construction.
/// Building a handle never touches the network — only [`crate::Client::batch`],
/// [`crate::Client::resolve`], or awaiting [`ChainHandle::resolve`] flushes
/// anything.
#[derive(Clone)]
pub struct ChainHandle(pub(crate) Arc<ChainHandleInner>);

impl ChainHandle {
    pub(crate) fn root(client: Weak<ClientInner>, ref_counter: Arc<AtomicU64>, key: impl Into<String>) -> Self {
        let chain = OperationChain::new().then(Operation::get(key));
        Self(Arc::new(ChainHandleInner {
            chain,
            parent: None,
            depth: 1,
            ref_id: OnceLock::new(),
            ref_counter,
            client,
        }))
    }

    fn child(&self, chain: OperationChain) -> Self {
        Self(Arc::new(ChainHandleInner {
            chain,
            parent: Some(self.clone()),
            depth: self.0.depth + 1,
            ref_id: OnceLock::new(),
            ref_counter: Arc::clone(&self.0.ref_counter),
            client: self.0.client.clone(),
        }))
    }

    /// Record a property read, returning the new leaf handle.
    #[must_use]
    pub fn get(&self, key: impl Into<String>) -> ChainHandle {
        self.child(self.0.chain.clone().then(Operation::get(key)))
    }

    /// Record an invocation of the current value with `args`, returning the
    /// new leaf handle. A [`ArgValue::Handle`] argument is spliced in as a
    /// [`NestedOperationMarker`] rather than flushed on its own — this is
    /// promise pipelining (spec §4.3): `client.add(client.increment(), 10)`
    /// builds two handles and travels as one chain when only `add`'s handle
    /// is resolved.
    #[must_use]
    pub fn apply(&self, args: Vec<ArgValue>) -> ChainHandle {
        let mut graph = self.0.chain.graph.clone();
        let values = args.into_iter().map(|arg| self.lower_arg(arg, &mut graph)).collect();
        let mut operations = self.0.chain.operations.clone();
        operations.push(Operation::apply(values));
        self.child(OperationChain { operations, graph })
    }

    /// Convenience for the `__asObject` introspection entrypoint (spec
    /// §4.5): equivalent to `self.get("__asObject").apply(vec![])`.
    #[must_use]
    pub fn as_object(&self) -> ChainHandle {
        self.get(AS_OBJECT_KEY).apply(vec![])
    }

    fn lower_arg(&self, arg: ArgValue, graph: &mut Graph) -> Value {
        match arg {
            ArgValue::Value(v) => v,
            ArgValue::Encoded(encoded) => splice(graph, &encoded),
            ArgValue::Handle(handle) => {
                let ref_id = handle.ensure_ref_id();
                Value::Nested(Box::new(NestedOperationMarker::first(ref_id, handle.0.chain.clone())))
            }
        }
    }

    /// Assign this handle's stable `refId` on first embedding as an
    /// argument, per spec §3's "lazily-assigned integer refId". Stable for
    /// the handle's lifetime: later embeddings reuse the same id, which is
    /// what lets [`crate::batch::dedupe_nested_markers`] recognize repeats
    /// within one flushed batch.
    pub(crate) fn ensure_ref_id(&self) -> RefId {
        *self.0.ref_id.get_or_init(|| RefId::new(self.0.ref_counter.fetch_add(1, Ordering::Relaxed)))
    }

    /// The recorded chain this handle carries. Exposed for tests and for
    /// callers building their own batches rather than going through
    /// [`crate::Client::batch`].
    #[must_use]
    pub fn chain(&self) -> &OperationChain {
        &self.0.chain
    }

    /// Depth from the root handle (the root itself is depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// `true` if `self` is `other`, or a direct ancestor of it, by proxy
    /// construction lineage — not by chain content. Two independently
    /// constructed handles with identical chains are never ancestors of one
    /// another. Backs [`filter_to_leaves`].
    #[must_use]
    pub fn is_ancestor_of(&self, other: &ChainHandle) -> bool {
        let mut cursor = Some(other.clone());
        while let Some(node) = cursor {
            if Arc::ptr_eq(&self.0, &node.0) {
                return true;
            }
            cursor = node.0.parent.clone();
        }
        false
    }

    /// Resolve this single handle by opening a one-shot batch against its
    /// owning client, per spec §9's "no implicit tick" resolution — Rust
    /// code awaits a handle instead of waiting for a microtask boundary.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ClientError::Rpc`] wrapping
    /// [`chainrpc_error::TransportError::Disposed`] if the owning client has
    /// been dropped, plus anything [`crate::Client::resolve`] itself can fail with.
    pub async fn resolve(&self) -> Result<Encoded, crate::ClientError> {
        let client = self
            .0
            .client
            .upgrade()
            .ok_or(chainrpc_error::RpcError::Transport(chainrpc_error::TransportError::Disposed))?;
        crate::Client::from_inner(client).resolve(self.clone()).await
    }
}

/// Splice a standalone [`Encoded`] literal into `graph`, shifting its node
/// indices past whatever `graph` already holds, and return the value to
/// embed in the owning `Apply` step's argument list.
///
/// Mirrors `chainrpc_executor::resolve_argument`'s splicing of a resolved
/// nested chain's graph into the merged argument graph — same shift-by-offset
/// trick, applied client-side to literal complex arguments instead of
/// server-side to replayed nested results.
fn splice(graph: &mut Graph, encoded: &Encoded) -> Value {
    let offset = graph.len();
    for node in &encoded.graph.nodes {
        graph.nodes.push(shift_node(node, offset));
    }
    shift_value(&encoded.root, offset)
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
        Node::Object(fields) => Node::Object(fields.iter().map(|(k, v)| (k.clone(), shift_value(v, offset))).collect()),
        Node::Map(entries) => Node::Map(entries.iter().map(|(k, v)| (shift_value(k, offset), shift_value(v, offset))).collect()),
        Node::Set(items) => Node::Set(items.iter().map(|v| shift_value(v, offset)).collect()),
        other => other.clone(),
    }
}

/// Drop every handle in `handles` that is a direct ancestor of another
/// handle also present in `handles`, leaving only the leaves — spec §4.3's
/// prefix filtering. `client.env`, `client.env.DO`, and
/// `client.env.DO.getByName('x')` never need to be sent in their own right
/// once `client.env.DO.getByName('x').add(1, 2)` is also present; each
/// intermediate step is implied by replaying the leaf's full chain.
///
/// Two handles are only ever considered comparable by parent-pointer
/// lineage, never by chain content — this intentionally does not collapse
/// two independently constructed handles that happen to record the same
/// operations (e.g. two separate `client.increment()` calls), since both
/// must execute.
#[must_use]
pub fn filter_to_leaves(handles: Vec<ChainHandle>) -> Vec<ChainHandle> {
    handles
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            !handles
                .iter()
                .enumerate()
                .any(|(j, other)| *i != j && candidate.is_ancestor_of(other))
        })
        .map(|(_, handle)| handle.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn detached_root(key: &str) -> ChainHandle {
        ChainHandle::root(Weak::new(), Arc::new(AtomicU64::new(0)), key)
    }

    #[test]
    fn get_appends_one_operation() {
        let root = detached_root("env");
        let child = root.get("DO");
        assert_eq!(child.chain().len(), 2);
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn apply_embeds_handle_as_nested_marker_with_chain_on_first_use() {
        let root = detached_root("counter");
        let arg = root.get("increment").apply(vec![]);
        let call = root.get("add").apply(vec![ArgValue::Handle(arg.clone())]);

        match &call.chain().operations.last().unwrap() {
            Operation::Apply { args } => match &args[0] {
                Value::Nested(marker) => {
                    assert_eq!(marker.ref_id, arg.ensure_ref_id());
                    assert!(marker.chain.is_some());
                }
                other => panic!("expected nested marker, got {other:?}"),
            },
            other => panic!("expected apply, got {other:?}"),
        }
    }

    #[test]
    fn ref_id_is_stable_across_repeated_embedding() {
        let root = detached_root("counter");
        let shared = root.get("increment").apply(vec![]);
        let first = shared.ensure_ref_id();
        let second = shared.ensure_ref_id();
        assert_eq!(first, second);
    }

    #[test]
    fn ancestor_detection_uses_identity_not_content() {
        let root = detached_root("env");
        let leaf = root.get("DO").get("getByName").apply(vec!["x".into()]).get("add").apply(vec![1.0.into(), 2.0.into()]);
        assert!(root.is_ancestor_of(&leaf));

        let independent = detached_root("env");
        assert!(!independent.is_ancestor_of(&leaf));
    }

    #[test]
    fn filter_to_leaves_drops_intermediate_ancestors() {
        let root = detached_root("env");
        let mid = root.get("DO");
        let leaf = mid.get("getByName").apply(vec!["x".into()]);

        let filtered = filter_to_leaves(vec![root.clone(), mid.clone(), leaf.clone()]);
        assert_eq!(filtered.len(), 1);
        assert!(Arc::ptr_eq(&filtered[0].0, &leaf.0));
    }

    #[test]
    fn filter_to_leaves_keeps_independent_identical_chains() {
        let root = detached_root("client");
        let a = root.get("increment").apply(vec![]);
        let b = root.get("increment").apply(vec![]);

        let filtered = filter_to_leaves(vec![a.clone(), b.clone()]);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn as_object_appends_reserved_get_and_empty_apply() {
        let root = detached_root("counter");
        let handle = root.as_object();
        assert_eq!(handle.chain().len(), 3);
        match &handle.chain().operations[1] {
            Operation::Get { key } => assert_eq!(key, AS_OBJECT_KEY),
            other => panic!("expected get, got {other:?}"),
        }
    }

    #[test]
    fn encoded_literal_argument_splices_graph_with_offset() {
        use chainrpc_core::value::{Graph as G, Node as N};

        let mut arg_graph = G::new();
        let inner = arg_graph.push(N::Array(vec![Value::Number(1.0)]));
        let literal = Encoded { root: Value::Ref(inner), graph: arg_graph };

        let root = detached_root("setPair");
        let call = root.apply(vec![ArgValue::Encoded(literal)]);

        assert_eq!(call.chain().graph.len(), 1);
        match &call.chain().operations[1] {
            Operation::Apply { args } => assert_eq!(args[0], Value::Ref(NodeRef(0))),
            other => panic!("expected apply, got {other:?}"),
        }
    }
}
