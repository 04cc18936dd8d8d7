//! The tuple wire format: every value is a `["type", payload]` pair, and
//! complex values additionally live in an `objects[]` table addressed by
//! `["$lmz", i]` reference tuples — this is what lets the codec round-trip
//! cycles and shared references that plain JSON cannot express.

use crate::chain::{decode_chain, encode_chain};
use chainrpc_core::value::{Encoded, ErrorNode, FunctionNode, Graph, Node, NodeRef, RequestNode, ResponseNode, Value};
use chainrpc_core::{
    NestedOperationMarker, OPERATION_CHAIN_KEY, REF_ID_KEY, REMOTE_FUNCTION_KEY, REMOTE_FUNCTION_NAME_KEY,
    RemoteFunctionMarker, RefId,
};
use chainrpc_error::SerializationError;
use serde_json::{Value as Json, json};

/// Tag for a reference into the accompanying `objects[]` table.
pub const TAG_REF: &str = "$lmz";
/// Tag for `null`.
pub const TAG_NULL: &str = "null";
/// Tag for `undefined`.
pub const TAG_UNDEFINED: &str = "undefined";
/// Tag for a boolean primitive.
pub const TAG_BOOLEAN: &str = "boolean";
/// Tag for a number primitive.
pub const TAG_NUMBER: &str = "number";
/// Tag for a string primitive.
pub const TAG_STRING: &str = "string";
/// Tag for a `BigInt` primitive.
pub const TAG_BIGINT: &str = "bigint";
/// Tag for a `Date`.
pub const TAG_DATE: &str = "date";
/// Tag for a `RegExp`.
pub const TAG_REGEXP: &str = "regexp";
/// Tag for an array node.
pub const TAG_ARRAY: &str = "array";
/// Tag for a plain object node.
pub const TAG_OBJECT: &str = "object";
/// Tag for a `Map` node.
pub const TAG_MAP: &str = "map";
/// Tag for a `Set` node.
pub const TAG_SET: &str = "set";
/// Tag for an error node.
pub const TAG_ERROR: &str = "error";
/// Tag for a `Headers` node.
pub const TAG_HEADERS: &str = "headers";
/// Tag for a `URL` node.
pub const TAG_URL: &str = "url";
/// Tag for a `Request` node.
pub const TAG_REQUEST: &str = "request";
/// Tag for a `Response` node.
pub const TAG_RESPONSE: &str = "response";
/// Tag for an `ArrayBuffer`/typed-array/`DataView` node.
pub const TAG_ARRAYBUFFER: &str = "arraybuffer";
/// Tag for a bare function marker (name only, no invocation chain).
pub const TAG_FUNCTION: &str = "function";
/// Tag for a boxed `Boolean` wrapper object.
pub const TAG_BOOLEAN_OBJECT: &str = "booleanObject";
/// Tag for a boxed `Number` wrapper object.
pub const TAG_NUMBER_OBJECT: &str = "numberObject";
/// Tag for a boxed `String` wrapper object.
pub const TAG_STRING_OBJECT: &str = "stringObject";
/// Tag for a boxed `BigInt` wrapper object.
pub const TAG_BIGINT_OBJECT: &str = "bigintObject";
/// Tag for an OCAN [`NestedOperationMarker`] argument.
pub const TAG_NESTED_OP: &str = "nestedOp";
/// Tag for an executor-produced [`RemoteFunctionMarker`] result.
pub const TAG_REMOTE_FUNCTION: &str = "remoteFunction";

fn tuple(tag: &str, payload: Json) -> Json {
    json!([tag, payload])
}

/// Sentinel for a NaN payload — `f64` NaN/Infinity have no JSON number form.
const SENTINEL_NAN: &str = "NaN";
/// Sentinel for positive infinity.
const SENTINEL_POS_INFINITY: &str = "Infinity";
/// Sentinel for negative infinity.
const SENTINEL_NEG_INFINITY: &str = "-Infinity";

/// Encode a number primitive, substituting the string sentinels
/// `"NaN"`/`"Infinity"`/`"-Infinity"` for values JSON cannot represent.
fn encode_number(n: f64) -> Json {
    if n.is_nan() {
        json!(SENTINEL_NAN)
    } else if n.is_infinite() {
        json!(if n > 0.0 { SENTINEL_POS_INFINITY } else { SENTINEL_NEG_INFINITY })
    } else {
        json!(n)
    }
}

/// Decode a number payload, recognizing the sentinel strings `encode_number`
/// produces before falling back to a plain JSON number.
fn decode_number(payload: &Json) -> f64 {
    match payload.as_str() {
        Some(SENTINEL_NAN) => f64::NAN,
        Some(SENTINEL_POS_INFINITY) => f64::INFINITY,
        Some(SENTINEL_NEG_INFINITY) => f64::NEG_INFINITY,
        _ => payload.as_f64().unwrap_or_default(),
    }
}

/// Encode a primitive or reference [`Value`] into its tagged-tuple wire form.
///
/// `Ref`s encode independent of any graph — they are self-contained indices
/// — so this never needs the owning [`Graph`].
#[must_use]
pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => tuple(TAG_NULL, Json::Null),
        Value::Undefined => tuple(TAG_UNDEFINED, Json::Null),
        Value::Bool(b) => tuple(TAG_BOOLEAN, json!(b)),
        Value::Number(n) => tuple(TAG_NUMBER, encode_number(*n)),
        Value::String(s) => tuple(TAG_STRING, json!(s)),
        Value::BigInt(s) => tuple(TAG_BIGINT, json!(s)),
        Value::Date(millis) => tuple(TAG_DATE, json!(millis)),
        Value::RegExp { source, flags } => {
            tuple(TAG_REGEXP, json!({"source": source, "flags": flags}))
        }
        Value::Ref(NodeRef(i)) => tuple(TAG_REF, json!(i)),
        Value::Nested(marker) => tuple(TAG_NESTED_OP, encode_nested_marker(marker)),
    }
}

fn encode_nested_marker(marker: &NestedOperationMarker) -> Json {
    json!({
        REF_ID_KEY: marker.ref_id.0,
        OPERATION_CHAIN_KEY: marker.chain.as_ref().map(encode_chain),
    })
}

fn decode_nested_marker(payload: &Json) -> Result<NestedOperationMarker, SerializationError> {
    let ref_id = payload
        .get(REF_ID_KEY)
        .and_then(Json::as_u64)
        .ok_or_else(|| SerializationError::UnknownTag {
            tag: TAG_NESTED_OP.to_string(),
        })?;
    let chain = match payload.get(OPERATION_CHAIN_KEY) {
        Some(Json::Null) | None => None,
        Some(c) => Some(decode_chain(c)?),
    };
    Ok(NestedOperationMarker {
        ref_id: RefId::new(ref_id),
        chain,
    })
}

fn encode_remote_function(marker: &RemoteFunctionMarker) -> Json {
    json!({
        REMOTE_FUNCTION_KEY: true,
        REMOTE_FUNCTION_NAME_KEY: marker.name,
        OPERATION_CHAIN_KEY: marker.chain.as_ref().map(encode_chain),
    })
}

fn decode_remote_function(payload: &Json) -> Result<RemoteFunctionMarker, SerializationError> {
    let name = payload
        .get(REMOTE_FUNCTION_NAME_KEY)
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();
    let chain = match payload.get(OPERATION_CHAIN_KEY) {
        Some(Json::Null) | None => None,
        Some(c) => Some(decode_chain(c)?),
    };
    Ok(RemoteFunctionMarker { name, chain })
}

/// Decode a tagged-tuple wire value back into a [`Value`].
///
/// # Errors
///
/// Returns [`SerializationError::UnknownTag`] for an unrecognized tag, or a
/// shape error if the payload doesn't match what the tag implies.
pub fn decode_value(wire: &Json) -> Result<Value, SerializationError> {
    let (tag, payload) = split_tuple(wire)?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_UNDEFINED => Ok(Value::Undefined),
        TAG_BOOLEAN => Ok(Value::Bool(payload.as_bool().unwrap_or_default())),
        TAG_NUMBER => Ok(Value::Number(decode_number(payload))),
        TAG_STRING => Ok(Value::String(payload.as_str().unwrap_or_default().to_string())),
        TAG_BIGINT => Ok(Value::BigInt(payload.as_str().unwrap_or_default().to_string())),
        TAG_DATE => Ok(Value::Date(payload.as_i64().unwrap_or_default())),
        TAG_REGEXP => Ok(Value::RegExp {
            source: payload.get("source").and_then(Json::as_str).unwrap_or_default().to_string(),
            flags: payload.get("flags").and_then(Json::as_str).unwrap_or_default().to_string(),
        }),
        TAG_REF => {
            let i = payload.as_u64().ok_or_else(|| SerializationError::UnknownTag {
                tag: TAG_REF.to_string(),
            })?;
            Ok(Value::Ref(NodeRef(i as usize)))
        }
        TAG_NESTED_OP => Ok(Value::Nested(Box::new(decode_nested_marker(payload)?))),
        other => Err(SerializationError::UnknownTag {
            tag: other.to_string(),
        }),
    }
}

fn split_tuple(wire: &Json) -> Result<(&str, &Json), SerializationError> {
    let arr = wire.as_array().ok_or_else(|| SerializationError::UnknownTag {
        tag: "<non-tuple>".to_string(),
    })?;
    let tag = arr
        .first()
        .and_then(Json::as_str)
        .ok_or_else(|| SerializationError::UnknownTag {
            tag: "<missing tag>".to_string(),
        })?;
    let payload = arr.get(1).unwrap_or(&Json::Null);
    Ok((tag, payload))
}

fn string_pairs(payload: &Json) -> Vec<(String, String)> {
    payload
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    Some((pair.first()?.as_str()?.to_string(), pair.get(1)?.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn encode_string_pairs(pairs: &[(String, String)]) -> Json {
    json!(pairs.iter().map(|(k, v)| json!([k, v])).collect::<Vec<_>>())
}

/// Encode a single [`Node`] into its tagged-tuple wire form.
#[must_use]
pub fn encode_node(node: &Node) -> Json {
    match node {
        Node::Array(items) => tuple(TAG_ARRAY, json!(items.iter().map(encode_value).collect::<Vec<_>>())),
        Node::Object(fields) => tuple(
            TAG_OBJECT,
            json!(
                fields
                    .iter()
                    .map(|(k, v)| json!([k, encode_value(v)]))
                    .collect::<Vec<_>>()
            ),
        ),
        Node::Map(entries) => tuple(
            TAG_MAP,
            json!(
                entries
                    .iter()
                    .map(|(k, v)| json!([encode_value(k), encode_value(v)]))
                    .collect::<Vec<_>>()
            ),
        ),
        Node::Set(items) => tuple(TAG_SET, json!(items.iter().map(encode_value).collect::<Vec<_>>())),
        Node::Error(e) => tuple(
            TAG_ERROR,
            json!({
                "name": e.name,
                "message": e.message,
                "stack": e.stack,
                "cause": e.cause.as_ref().map(|c| encode_value(c)),
                "custom": e.custom.iter().map(|(k, v)| json!([k, encode_value(v)])).collect::<Vec<_>>(),
            }),
        ),
        Node::Headers(pairs) => tuple(TAG_HEADERS, encode_string_pairs(pairs)),
        Node::Url(s) => tuple(TAG_URL, json!(s)),
        Node::Request(r) => tuple(
            TAG_REQUEST,
            json!({
                "method": r.method,
                "url": r.url,
                "headers": encode_string_pairs(&r.headers),
                "body": r.body.as_ref().map(|b| base64_encode(b)),
            }),
        ),
        Node::Response(r) => tuple(
            TAG_RESPONSE,
            json!({
                "status": r.status,
                "statusText": r.status_text,
                "headers": encode_string_pairs(&r.headers),
                "body": r.body.as_ref().map(|b| base64_encode(b)),
            }),
        ),
        Node::ArrayBuffer(bytes) => tuple(TAG_ARRAYBUFFER, json!(base64_encode(bytes))),
        Node::Function(f) => tuple(TAG_FUNCTION, json!({"name": f.name})),
        Node::RemoteFunction(marker) => tuple(TAG_REMOTE_FUNCTION, encode_remote_function(marker)),
        Node::BooleanObject(b) => tuple(TAG_BOOLEAN_OBJECT, json!(b)),
        Node::NumberObject(n) => tuple(TAG_NUMBER_OBJECT, encode_number(*n)),
        Node::StringObject(s) => tuple(TAG_STRING_OBJECT, json!(s)),
        Node::BigIntObject(s) => tuple(TAG_BIGINT_OBJECT, json!(s)),
    }
}

/// Decode a single tagged-tuple wire node back into a [`Node`].
///
/// # Errors
///
/// Returns [`SerializationError::UnknownTag`] for an unrecognized tag.
pub fn decode_node(wire: &Json) -> Result<Node, SerializationError> {
    let (tag, payload) = split_tuple(wire)?;
    match tag {
        TAG_ARRAY => {
            let items = payload
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Array(items))
        }
        TAG_OBJECT => {
            let fields = payload
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(|pair| {
                    let pair = pair.as_array().unwrap_or(&vec![]).to_vec();
                    let key = pair.first().and_then(Json::as_str).unwrap_or_default().to_string();
                    let value = pair.get(1).cloned().unwrap_or(Json::Null);
                    Ok::<_, SerializationError>((key, decode_value(&value)?))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Object(fields))
        }
        TAG_MAP => {
            let entries = payload
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(|pair| {
                    let pair = pair.as_array().ok_or_else(|| SerializationError::UnknownTag {
                        tag: TAG_MAP.to_string(),
                    })?;
                    let k = decode_value(pair.first().unwrap_or(&Json::Null))?;
                    let v = decode_value(pair.get(1).unwrap_or(&Json::Null))?;
                    Ok::<_, SerializationError>((k, v))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Map(entries))
        }
        TAG_SET => {
            let items = payload
                .as_array()
                .unwrap_or(&vec![])
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Set(items))
        }
        TAG_ERROR => {
            let cause = match payload.get("cause") {
                Some(Json::Null) | None => None,
                Some(c) => Some(Box::new(decode_value(c)?)),
            };
            let custom = payload
                .get("custom")
                .and_then(Json::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|pair| {
                            let pair = pair.as_array()?;
                            let key = pair.first()?.as_str()?.to_string();
                            let value = decode_value(pair.get(1)?).ok()?;
                            Some((key, value))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(Node::Error(ErrorNode {
                name: payload.get("name").and_then(Json::as_str).unwrap_or("Error").to_string(),
                message: payload.get("message").and_then(Json::as_str).unwrap_or_default().to_string(),
                stack: payload.get("stack").and_then(Json::as_str).map(str::to_string),
                cause,
                custom,
            }))
        }
        TAG_HEADERS => Ok(Node::Headers(string_pairs(payload))),
        TAG_URL => Ok(Node::Url(payload.as_str().unwrap_or_default().to_string())),
        TAG_REQUEST => Ok(Node::Request(RequestNode {
            method: payload.get("method").and_then(Json::as_str).unwrap_or("GET").to_string(),
            url: payload.get("url").and_then(Json::as_str).unwrap_or_default().to_string(),
            headers: payload.get("headers").map(string_pairs).unwrap_or_default(),
            body: payload
                .get("body")
                .and_then(Json::as_str)
                .map(base64_decode)
                .transpose()?,
        })),
        TAG_RESPONSE => Ok(Node::Response(ResponseNode {
            status: payload.get("status").and_then(Json::as_u64).unwrap_or(200) as u16,
            status_text: payload.get("statusText").and_then(Json::as_str).unwrap_or_default().to_string(),
            headers: payload.get("headers").map(string_pairs).unwrap_or_default(),
            body: payload
                .get("body")
                .and_then(Json::as_str)
                .map(base64_decode)
                .transpose()?,
        })),
        TAG_ARRAYBUFFER => Ok(Node::ArrayBuffer(base64_decode(
            payload.as_str().unwrap_or_default(),
        )?)),
        TAG_FUNCTION => Ok(Node::Function(FunctionNode {
            name: payload.get("name").and_then(Json::as_str).unwrap_or_default().to_string(),
        })),
        TAG_REMOTE_FUNCTION => Ok(Node::RemoteFunction(decode_remote_function(payload)?)),
        TAG_BOOLEAN_OBJECT => Ok(Node::BooleanObject(payload.as_bool().unwrap_or_default())),
        TAG_NUMBER_OBJECT => Ok(Node::NumberObject(decode_number(payload))),
        TAG_STRING_OBJECT => Ok(Node::StringObject(payload.as_str().unwrap_or_default().to_string())),
        TAG_BIGINT_OBJECT => Ok(Node::BigIntObject(payload.as_str().unwrap_or_default().to_string())),
        other => Err(SerializationError::UnknownTag {
            tag: other.to_string(),
        }),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(if let Some(b1) = b1 {
            ALPHABET[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if let Some(b2) = b2 {
            ALPHABET[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn base64_decode(s: &str) -> Result<Vec<u8>, SerializationError> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
    for chunk in bytes.chunks(4) {
        let v: Vec<u8> = chunk.iter().copied().filter(|&c| c != b'=').filter_map(val).collect();
        if v.is_empty() {
            continue;
        }
        if v.len() >= 2 {
            out.push((v[0] << 2) | (v[1] >> 4));
        }
        if v.len() >= 3 {
            out.push((v[1] << 4) | (v[2] >> 2));
        }
        if v.len() >= 4 {
            out.push((v[2] << 6) | v[3]);
        }
    }
    Ok(out)
}

/// Encode a whole [`Graph`]'s node table into its wire array form.
#[must_use]
pub fn encode_graph(graph: &Graph) -> Json {
    json!(graph.nodes.iter().map(encode_node).collect::<Vec<_>>())
}

/// Decode a wire array of tagged-tuple nodes back into a [`Graph`].
///
/// # Errors
///
/// Returns [`SerializationError`] if any node fails to decode, or
/// [`SerializationError::DanglingReference`] if a decoded value references
/// an index outside the table once fully built.
pub fn decode_graph(wire: &Json) -> Result<Graph, SerializationError> {
    let nodes = wire
        .as_array()
        .ok_or_else(|| SerializationError::UnknownTag {
            tag: "<objects not an array>".to_string(),
        })?
        .iter()
        .map(decode_node)
        .collect::<Result<Vec<_>, _>>()?;
    let graph = Graph { nodes };
    validate_refs(&graph)?;
    Ok(graph)
}

fn validate_refs(graph: &Graph) -> Result<(), SerializationError> {
    fn check(v: &Value, len: usize) -> Result<(), SerializationError> {
        if let Value::Ref(NodeRef(i)) = v {
            if *i >= len {
                return Err(SerializationError::DanglingReference { index: *i });
            }
        }
        Ok(())
    }
    let len = graph.nodes.len();
    for node in &graph.nodes {
        match node {
            Node::Array(items) | Node::Set(items) => {
                for v in items {
                    check(v, len)?;
                }
            }
            Node::Object(fields) => {
                for (_, v) in fields {
                    check(v, len)?;
                }
            }
            Node::Map(entries) => {
                for (k, v) in entries {
                    check(k, len)?;
                    check(v, len)?;
                }
            }
            Node::Error(e) => {
                if let Some(c) = &e.cause {
                    check(c, len)?;
                }
                for (_, v) in &e.custom {
                    check(v, len)?;
                }
            }
            Node::Headers(_)
            | Node::Url(_)
            | Node::Request(_)
            | Node::Response(_)
            | Node::ArrayBuffer(_)
            | Node::Function(_)
            | Node::RemoteFunction(_)
            | Node::BooleanObject(_)
            | Node::NumberObject(_)
            | Node::StringObject(_)
            | Node::BigIntObject(_) => {}
        }
    }
    Ok(())
}

/// Encode a complete [`Encoded`] value (root + graph) into its wire document form.
#[must_use]
pub fn encode_encoded(value: &Encoded) -> Json {
    json!({
        "root": encode_value(&value.root),
        "objects": encode_graph(&value.graph),
    })
}

/// Decode a wire document back into an [`Encoded`] value.
///
/// # Errors
///
/// Returns [`SerializationError`] if the document is malformed.
pub fn decode_encoded(wire: &Json) -> Result<Encoded, SerializationError> {
    let root_wire = wire.get("root").ok_or_else(|| SerializationError::UnknownTag {
        tag: "<missing root>".to_string(),
    })?;
    let objects_wire = wire.get("objects").cloned().unwrap_or(json!([]));
    let graph = decode_graph(&objects_wire)?;
    let root = decode_value(root_wire)?;
    Ok(Encoded { root, graph })
}
