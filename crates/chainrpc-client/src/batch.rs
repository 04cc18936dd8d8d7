//! Batch assembly: turning a set of [`ChainHandle`]s into one
//! [`BatchRequest`], with the per-batch alias dedup pass spec §4.3 and §9
//! require — the first occurrence of an embedded handle within the batch
//! being flushed carries its chain, every later occurrence of the *same*
//! handle is reduced to a bare `refId` alias.
//!
//! Aliasing scope is per flush, not per handle lifetime: the same handle
//! resolved in two separate [`crate::Client::batch`] calls is re-examined
//! fresh each time, matching the executor's own per-batch `refId` memo.

use std::collections::HashSet;

use chainrpc_codec::{BatchRequest, encode_chain};
use chainrpc_core::value::{Node, Value};
use chainrpc_core::{Operation, OperationChain};

use crate::handle::ChainHandle;

/// Walk every chain in `chains`, clearing the embedded chain off every
/// [`Value::Nested`] marker whose `refId` has already been seen earlier in
/// the same walk. Mutates in place.
pub fn dedupe_nested_markers(chains: &mut [OperationChain]) {
    let mut seen = HashSet::new();
    for chain in chains.iter_mut() {
        dedupe_chain(chain, &mut seen);
    }
}

fn dedupe_chain(chain: &mut OperationChain, seen: &mut HashSet<u64>) {
    for op in &mut chain.operations {
        if let Operation::Apply { args } = op {
            for arg in args.iter_mut() {
                dedupe_value(arg, seen);
            }
        }
    }
    for node in &mut chain.graph.nodes {
        dedupe_node(node, seen);
    }
}

fn dedupe_value(value: &mut Value, seen: &mut HashSet<u64>) {
    let Value::Nested(marker) = value else {
        return;
    };
    let ref_id = marker.ref_id.0;
    if seen.contains(&ref_id) {
        marker.chain = None;
        return;
    }
    seen.insert(ref_id);
    if let Some(nested) = marker.chain.as_mut() {
        dedupe_chain(nested, seen);
    }
}

fn dedupe_node(node: &mut Node, seen: &mut HashSet<u64>) {
    match node {
        Node::Array(items) | Node::Set(items) => {
            for v in items {
                dedupe_value(v, seen);
            }
        }
        Node::Object(fields) => {
            for (_, v) in fields {
                dedupe_value(v, seen);
            }
        }
        Node::Map(entries) => {
            for (k, v) in entries {
                dedupe_value(k, seen);
                dedupe_value(v, seen);
            }
        }
        _ => {}
    }
}

/// Build the [`BatchRequest`] for one flush: one chain per handle, in the
/// order given, after the alias dedup pass.
#[must_use]
pub(crate) fn build_request(id: String, handles: &[ChainHandle]) -> BatchRequest {
    let mut chains: Vec<OperationChain> = handles.iter().map(|h| h.chain().clone()).collect();
    dedupe_nested_markers(&mut chains);
    BatchRequest {
        id,
        chains: chains.iter().map(encode_chain).collect(),
    }
}
