//! Wire (de)serialization for [`OperationChain`] — the recorded sequence of
//! `Get`/`Apply` steps a client sends for a server to replay.
//!
//! An operation chain shares the same reference-table trick as a plain
//! [`Encoded`](chainrpc_core::Encoded) value: `Apply` arguments are
//! [`Value`]s which may be `Ref`s into an accompanying `objects[]` table, so
//! two arguments of the same `Apply` step (or arguments across different
//! steps) can alias the same graph node.

use crate::value::{decode_graph, decode_value, encode_graph, encode_value};
use chainrpc_core::{Operation, OperationChain};
use chainrpc_error::SerializationError;
use serde_json::{Value as Json, json};

const OP_GET: &str = "get";
const OP_APPLY: &str = "apply";

fn encode_operation(op: &Operation) -> Json {
    match op {
        Operation::Get { key } => json!([OP_GET, key]),
        Operation::Apply { args } => json!([OP_APPLY, args.iter().map(encode_value).collect::<Vec<_>>()]),
    }
}

fn decode_operation(wire: &Json) -> Result<Operation, SerializationError> {
    let arr = wire.as_array().ok_or_else(|| SerializationError::UnknownTag {
        tag: "<non-tuple operation>".to_string(),
    })?;
    let tag = arr
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| SerializationError::UnknownTag {
            tag: "<missing operation tag>".to_string(),
        })?;
    let payload = arr.get(1).unwrap_or(&Json::Null);
    match tag {
        OP_GET => Ok(Operation::get(payload.as_str().unwrap_or_default())),
        OP_APPLY => {
            let args = payload
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Operation::apply(args))
        }
        other => Err(SerializationError::UnknownTag { tag: other.to_string() }),
    }
}

/// Encode an [`OperationChain`] into its wire document form: an ordered list
/// of operation tuples plus the shared reference table backing their
/// `Apply` arguments.
#[must_use]
pub fn encode_chain(chain: &OperationChain) -> Json {
    json!({
        "operations": chain.operations.iter().map(encode_operation).collect::<Vec<_>>(),
        "objects": encode_graph(&chain.graph),
    })
}

/// Decode a wire document back into an [`OperationChain`].
///
/// # Errors
///
/// Returns [`SerializationError`] if the document is malformed or any
/// argument references an out-of-range graph index.
pub fn decode_chain(wire: &Json) -> Result<OperationChain, SerializationError> {
    let operations = wire
        .get("operations")
        .and_then(Json::as_array)
        .ok_or_else(|| SerializationError::UnknownTag {
            tag: "<missing operations>".to_string(),
        })?
        .iter()
        .map(decode_operation)
        .collect::<Result<Vec<_>, _>>()?;
    let graph = decode_graph(&wire.get("objects").cloned().unwrap_or(json!([])))?;
    Ok(OperationChain { operations, graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrpc_core::value::{Graph, Node, Value};

    #[test]
    fn simple_get_apply_chain_roundtrips() {
        let chain = OperationChain::new()
            .then(Operation::get("counter"))
            .then(Operation::get("increment"))
            .then(Operation::apply(vec![Value::Number(1.0)]));

        let wire = encode_chain(&chain);
        let decoded = decode_chain(&wire).unwrap();

        assert_eq!(decoded.len(), 3);
        assert!(decoded.operations[0].is_get());
        match &decoded.operations[2] {
            Operation::Apply { args } => assert_eq!(args, &vec![Value::Number(1.0)]),
            other => panic!("expected apply, got {other:?}"),
        }
    }

    #[test]
    fn aliased_apply_arguments_share_graph_index_after_roundtrip() {
        let mut graph = Graph::new();
        let shared = graph.push(Node::Object(vec![("id".into(), Value::Number(7.0))]));
        let chain = OperationChain {
            operations: vec![
                Operation::get("setPair"),
                Operation::apply(vec![Value::Ref(shared), Value::Ref(shared)]),
            ],
            graph,
        };

        let wire = encode_chain(&chain);
        let decoded = decode_chain(&wire).unwrap();

        match &decoded.operations[1] {
            Operation::Apply { args } => match (&args[0], &args[1]) {
                (Value::Ref(a), Value::Ref(b)) => assert_eq!(a, b),
                other => panic!("expected both args to be refs, got {other:?}"),
            },
            other => panic!("expected apply, got {other:?}"),
        }
    }

    #[test]
    fn malformed_operation_tag_is_rejected() {
        let wire = json!({"operations": [["bogus", null]], "objects": []});
        assert_eq!(
            decode_chain(&wire),
            Err(SerializationError::UnknownTag { tag: "bogus".to_string() })
        );
    }
}
