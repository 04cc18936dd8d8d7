//! Client-facing error type.
//!
//! Errors that originate on this side of the wire (malformed chains caught
//! by fail-fast validation, transport failures, wire decode failures) carry
//! their full [`RpcError`] structure. A chain that a server rejected or
//! failed to replay crosses back as the full error payload the server
//! reported for this batch entry (see
//! [`chainrpc_codec::BatchItemStatus::Failed`]), so those surface as
//! [`ClientError::Remote`] rather than being shoehorned back into one of
//! [`RpcError`]'s structured variants.

use chainrpc_error::RpcError;
use thiserror::Error;

/// Everything a [`crate::Client`] operation can fail with.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// A failure this side of the wire: fail-fast validation, a transport
    /// problem, or a wire decode failure.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The server replayed the chain and it threw or failed; every field is
    /// exactly what the server reported for this batch entry, including the
    /// thrown error's `cause` and any custom enumerable properties (e.g.
    /// `code`, `statusCode`, `metadata`).
    #[error("remote chain replay failed ({code}): {message}")]
    Remote {
        /// Stable error code, e.g. `"RPC-R001"`.
        code: String,
        /// `Error.name`-equivalent, e.g. `"RangeError"`.
        name: String,
        /// Rendered error message from the server.
        message: String,
        /// Optional stack-trace-equivalent text.
        stack: Option<String>,
        /// Optional nested cause payload.
        cause: Option<Box<chainrpc_error::ErrorPayload>>,
        /// Custom enumerable properties beyond name/message/stack/cause.
        custom: Vec<(String, serde_json::Value)>,
    },

    /// The server never attempted this chain because an earlier problem
    /// rejected the batch as a whole.
    #[error("chain skipped by server: {reason}")]
    Skipped {
        /// Reason the server gave for skipping.
        reason: String,
    },
}

impl ClientError {
    /// Build a [`ClientError::Remote`] from a server-reported
    /// [`chainrpc_codec::BatchItemStatus::Failed`].
    #[must_use]
    pub fn remote(
        code: String,
        name: String,
        message: String,
        stack: Option<String>,
        cause: Option<Box<chainrpc_error::ErrorPayload>>,
        custom: Vec<(String, serde_json::Value)>,
    ) -> Self {
        Self::Remote { code, name, message, stack, cause, custom }
    }
}
