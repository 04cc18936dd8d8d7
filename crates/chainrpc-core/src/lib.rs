// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Operation vocabulary, value model, and the [`ReplayTarget`] seam shared by
//! every other ChainRPC crate.
//!
//! If you only take one dependency for the shared vocabulary, take this one.

/// The `Operation`/`Apply` step vocabulary and `OperationChain`.
pub mod operation;
/// `RefId`, `NestedOperationMarker`, `RemoteFunctionMarker`.
pub mod marker;
/// `ReplayTarget`, the seam between the executor and a durable-object host.
pub mod target;
/// The in-memory value model (`Value`/`Node`/`Graph`/`Encoded`).
pub mod value;

pub use marker::{
    NestedOperationMarker, RefId, RemoteFunctionMarker, OPERATION_CHAIN_KEY, REF_ID_KEY,
    REMOTE_FUNCTION_KEY, REMOTE_FUNCTION_NAME_KEY,
};
pub use operation::{Operation, OperationChain};
pub use target::ReplayTarget;
pub use value::{Encoded, ErrorNode, FunctionNode, Graph, Node, NodeRef, RequestNode, ResponseNode, Value};

/// Current wire-contract version embedded in every `BatchRequest`/`BatchResponse`.
///
/// # Examples
///
/// ```
/// assert_eq!(chainrpc_core::CONTRACT_VERSION, "chainrpc/v1");
/// ```
pub const CONTRACT_VERSION: &str = "chainrpc/v1";

/// Default maximum chain depth (`Operation` count) accepted by validation.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Default maximum argument count accepted per `Apply` step.
pub const DEFAULT_MAX_ARGS: usize = 100;

/// Default route prefix segment used by the dispatch router.
pub const DEFAULT_PREFIX: &str = "__rpc";
