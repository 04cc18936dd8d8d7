//! Golden-shape tests pinning the exact JSON the wire codec produces.
//!
//! These are deliberately literal rather than round-trip-only: the wire
//! format is a contract other (non-Rust) peers implement against, so a
//! silent shape change here is exactly the kind of regression worth pinning
//! down to an exact `json!` value.

use chainrpc_codec::{encode_encoded, encode_node, encode_value};
use chainrpc_core::value::{Encoded, ErrorNode, Graph, Node, NodeRef, Value};
use serde_json::json;

#[test]
fn primitive_tuples_match_golden_shape() {
    assert_eq!(encode_value(&Value::Number(1.0)), json!(["number", 1.0]));
    assert_eq!(encode_value(&Value::String("hi".into())), json!(["string", "hi"]));
    assert_eq!(encode_value(&Value::Undefined), json!(["undefined", null]));
    assert_eq!(
        encode_value(&Value::RegExp { source: "a+".into(), flags: "gi".into() }),
        json!(["regexp", {"source": "a+", "flags": "gi"}])
    );
    assert_eq!(encode_value(&Value::Ref(NodeRef(3))), json!(["$lmz", 3]));
}

#[test]
fn object_node_preserves_key_order() {
    let node = Node::Object(vec![
        ("b".into(), Value::Number(2.0)),
        ("a".into(), Value::Number(1.0)),
    ]);
    assert_eq!(
        encode_node(&node),
        json!(["object", [["b", ["number", 2.0]], ["a", ["number", 1.0]]]])
    );
}

#[test]
fn error_node_matches_golden_shape() {
    let node = Node::Error(ErrorNode {
        name: "TypeError".into(),
        message: "not a function".into(),
        stack: None,
        cause: None,
        custom: vec![],
    });
    assert_eq!(
        encode_node(&node),
        json!(["error", {"name": "TypeError", "message": "not a function", "stack": null, "cause": null, "custom": []}])
    );
}

#[test]
fn full_document_has_root_and_objects_keys() {
    let mut graph = Graph::new();
    let r = graph.push(Node::Array(vec![Value::Number(1.0), Value::Number(2.0)]));
    let encoded = Encoded { root: Value::Ref(r), graph };
    assert_eq!(
        encode_encoded(&encoded),
        json!({
            "root": ["$lmz", 0],
            "objects": [["array", [["number", 1.0], ["number", 2.0]]]],
        })
    );
}
