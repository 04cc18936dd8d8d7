// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-codec
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The structured-clone style tuple wire format: every value travels as a
//! `["type", payload]` tuple, complex values live in a shared `objects[]`
//! table addressed by `["$lmz", i]` references. Application-level object
//! shapes the OCAN layer cares about — nested-operation markers, remote-
//! function markers — are not spliced in via a generic hook; they are
//! ordinary tagged-tuple variants (`"nestedOp"`, `"remoteFunction"`) this
//! codec encodes/decodes directly, the same as any built-in type (see
//! [`value::TAG_NESTED_OP`]).
//!
//! This crate never derives `Serialize`/`Deserialize` on
//! [`chainrpc_core::Value`] or [`chainrpc_core::Node`] directly — both types
//! are foreign to this crate, so doing so would collide with the orphan
//! rule the moment any other crate wanted to do the same. Instead it exposes
//! plain encode/decode functions operating on [`serde_json::Value`].

pub mod batch;
pub mod chain;
pub mod version;
pub mod value;

pub use batch::{BatchItemResult, BatchItemStatus, BatchRequest, BatchResponse, BatchValidationError, MAX_BATCH_SIZE};
pub use chain::{decode_chain, encode_chain};
pub use version::{VersionError, WireVersion};
pub use value::{
    decode_encoded, decode_graph, decode_node, decode_value, encode_encoded, encode_graph, encode_node, encode_value,
};
