//! Per-tick batching of recorded operation chains: a client accumulates
//! chains across a tick (or an explicit `client.batch(...)` call) and ships
//! them to the server as a single [`BatchRequest`], getting back one
//! [`BatchResponse`] with a result per chain, in the same order.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Maximum number of chains allowed in a single batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// A batch of wire-encoded operation chains to replay together.
///
/// `chains` holds each chain's wire document (as produced by
/// [`crate::chain::encode_chain`]) rather than a typed [`OperationChain`]
/// directly — batches travel as JSON, and the chain/value types intentionally
/// carry no serde impls of their own.
///
/// [`OperationChain`]: chainrpc_core::OperationChain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Unique identifier for this batch.
    pub id: String,
    /// Wire-encoded chain documents, one per recorded call.
    pub chains: Vec<Json>,
}

/// The result of replaying an entire batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Identifier of the originating [`BatchRequest`].
    pub request_id: String,
    /// Per-chain results, one for each input chain, in order.
    pub results: Vec<BatchItemResult>,
}

/// Outcome for a single chain within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Zero-based index of the chain in the original request.
    pub index: usize,
    /// Whether replay succeeded, failed, or the chain was never attempted.
    pub status: BatchItemStatus,
    /// The wire-encoded [`chainrpc_core::Encoded`] result document, present
    /// only on [`BatchItemStatus::Success`].
    pub result: Option<Json>,
}

/// Status of a single chain's replay within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchItemStatus {
    /// The chain replayed successfully.
    Success,
    /// The chain failed to replay.
    Failed {
        /// The stable error code, e.g. `"RPC-R001"`.
        code: String,
        /// `Error.name`-equivalent, e.g. `"RangeError"`.
        #[serde(default = "default_error_name")]
        name: String,
        /// Human-readable error description.
        message: String,
        /// Optional stack-trace-equivalent text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        /// Optional nested cause payload, preserved from a thrown target error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<Box<chainrpc_error::ErrorPayload>>,
        /// Custom enumerable properties beyond name/message/stack/cause, e.g.
        /// a thrown error's `code`, `statusCode`, or `metadata`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        custom: Vec<(String, Json)>,
    },
    /// The chain was never attempted because an earlier validation error
    /// rejected the batch as a whole.
    Skipped {
        /// Reason the chain was skipped.
        reason: String,
    },
}

fn default_error_name() -> String {
    "Error".to_string()
}

impl BatchItemStatus {
    /// Build a [`BatchItemStatus::Failed`] from the error payload produced
    /// for a chain's replay failure.
    #[must_use]
    pub fn failed(payload: chainrpc_error::ErrorPayload) -> Self {
        Self::Failed {
            code: payload.code,
            name: payload.name,
            message: payload.message,
            stack: payload.stack,
            cause: payload.cause,
            custom: payload.custom,
        }
    }
}

/// Validation error for a batch request, checked before any chain in it is
/// replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchValidationError {
    /// The batch contains no chains.
    EmptyBatch,
    /// The batch exceeds [`MAX_BATCH_SIZE`].
    TooManyItems {
        /// Actual number of chains submitted.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },
}

impl std::fmt::Display for BatchValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBatch => write!(f, "batch is empty"),
            Self::TooManyItems { count, max } => {
                write!(f, "batch has {count} chains, max is {max}")
            }
        }
    }
}

impl std::error::Error for BatchValidationError {}

/// Validate a batch request's shape before attempting to replay it.
///
/// # Errors
///
/// Returns every [`BatchValidationError`] that applies; an empty `Vec` means
/// the batch may proceed.
#[must_use]
pub fn validate_batch(request: &BatchRequest) -> Vec<BatchValidationError> {
    let mut errors = Vec::new();

    if request.chains.is_empty() {
        errors.push(BatchValidationError::EmptyBatch);
    }

    if request.chains.len() > MAX_BATCH_SIZE {
        errors.push(BatchValidationError::TooManyItems {
            count: request.chains.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    errors
}
