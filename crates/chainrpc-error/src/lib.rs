//! Unified error taxonomy with stable error codes for ChainRPC.
//!
//! Every error surfaced by a ChainRPC crate falls into one of five
//! categories — [`ValidationError`], [`ReplayError`], [`UserError`],
//! [`TransportError`], [`SerializationError`] — each carrying a stable,
//! greppable code (`RPC-V001`, `RPC-R003`, …). [`RpcError`] unifies all five
//! into the single type that crosses the wire back to a client, alongside the
//! [`ErrorPayload`] it serializes into.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad family an error code belongs to, matching the taxonomy in the
/// error-handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Chain shape/limit rejected before replay (depth, arg count, malformed operations).
    Validation,
    /// Chain replay against the target failed (property missing, not callable, promise rejected).
    Replay,
    /// The target itself threw; the error is user/application data, not a runtime fault.
    User,
    /// Transport-level failure (disconnect, timeout, queue overflow).
    Transport,
    /// Wire codec failed to encode or decode a value.
    Serialization,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Replay => "replay",
            Self::User => "user",
            Self::Transport => "transport",
            Self::Serialization => "serialization",
        };
        f.write_str(s)
    }
}

/// Stable, machine-readable error code (`RPC-V001`, `RPC-R003`, …).
///
/// # Examples
///
/// ```
/// use chainrpc_error::{ErrorCategory, ValidationError};
///
/// let err = ValidationError::ChainTooDeep { depth: 51, max: 50 };
/// assert_eq!(err.code(), "RPC-V001");
/// assert_eq!(err.category(), ErrorCategory::Validation);
/// ```
pub trait ErrorCode {
    /// Broad category this error belongs to.
    fn category(&self) -> ErrorCategory;
    /// Stable code string, e.g. `"RPC-V001"`.
    fn code(&self) -> &'static str;
}

/// Chain rejected before replay: depth, argument count, or shape limits.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Chain length exceeds the configured maximum depth.
    #[error("chain too deep: {depth} > {max}")]
    ChainTooDeep {
        /// Observed chain length.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },
    /// An `Apply` operation's argument list exceeds the configured maximum.
    #[error("Too many arguments: {count} > {max}")]
    TooManyArguments {
        /// Observed argument count.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A chain with zero operations was submitted.
    #[error("operation chain must contain at least one operation")]
    EmptyChain,
    /// The path segments of an inbound request do not match `{prefix}/{binding}/{instance}`.
    #[error("path does not match the expected rpc route shape")]
    MalformedRoute,
    /// A chain's first operation was not a property `Get`.
    #[error("operation chain must begin with a property get")]
    ChainMustStartWithGet,
}

impl ErrorCode for ValidationError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }

    fn code(&self) -> &'static str {
        match self {
            Self::ChainTooDeep { .. } => "RPC-V001",
            Self::TooManyArguments { .. } => "RPC-V002",
            Self::EmptyChain => "RPC-V003",
            Self::MalformedRoute => "RPC-V004",
            Self::ChainMustStartWithGet => "RPC-V005",
        }
    }
}

/// Chain replay against a [`ReplayTarget`](https://docs.rs/chainrpc-core) failed.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayError {
    /// A Get step found no such property and no fallback was available.
    #[error("no such property: {key}")]
    NoSuchProperty {
        /// Property name that was looked up.
        key: String,
    },
    /// An Apply step attempted to call a value that is not a function.
    #[error("value is not callable")]
    NotAFunction,
    /// Post-processing the replayed result failed.
    #[error("failed to post-process result: {reason}")]
    PostProcessingFailed {
        /// Human-readable reason.
        reason: String,
    },
    /// A nested-operation argument's `refId` was not found in the batch memo.
    #[error("unresolved nested operation reference: {ref_id}")]
    UnresolvedReference {
        /// The dangling refId.
        ref_id: u64,
    },
}

impl ErrorCode for ReplayError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Replay
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NoSuchProperty { .. } => "RPC-R001",
            Self::NotAFunction => "RPC-R002",
            Self::PostProcessingFailed { .. } => "RPC-R003",
            Self::UnresolvedReference { .. } => "RPC-R004",
        }
    }
}

/// The target itself threw. Carries the thrown value's serialized shape
/// (name/message/stack/cause/custom fields), not a runtime fault.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[error("{message}")]
pub struct UserError {
    /// `Error.name`-equivalent, e.g. `"RangeError"`, or `"Error"` if unknown.
    pub name: String,
    /// Human-readable message as thrown by the target.
    pub message: String,
    /// Optional stack-trace-equivalent text.
    pub stack: Option<String>,
    /// The thrown error's own `cause`, when the target set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<UserError>>,
    /// Enumerable own properties beyond name/message/stack/cause, e.g. a
    /// thrown error's `code`, `statusCode`, or `metadata`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<(String, serde_json::Value)>,
}

impl UserError {
    /// Construct a [`UserError`] with no cause or custom properties.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
            custom: Vec::new(),
        }
    }

    /// Render this error's own fields into a wire-ready [`ErrorPayload`],
    /// recursively converting `cause`.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            category: self.category(),
            name: self.name.clone(),
            message: self.message.clone(),
            stack: self.stack.clone(),
            cause: self.cause.as_ref().map(|c| Box::new(c.to_payload())),
            custom: self.custom.clone(),
        }
    }
}

impl ErrorCode for UserError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::User
    }

    fn code(&self) -> &'static str {
        "RPC-U001"
    }
}

/// Transport-level failure: disconnect, timeout, or queue overflow.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportError {
    /// The connection was closed or never established.
    #[error("transport disconnected")]
    Disconnected,
    /// A batch's deadline elapsed before a response arrived.
    #[error("batch timed out after {millis}ms")]
    Timeout {
        /// Deadline that elapsed, in milliseconds.
        millis: u64,
    },
    /// The connecting-state send queue's byte budget was exceeded.
    #[error("send queue overflow: {pending} bytes pending, budget is {budget}")]
    QueueOverflow {
        /// Bytes already queued.
        pending: usize,
        /// Configured byte budget.
        budget: usize,
    },
    /// The client or server was explicitly disposed while the batch was in flight.
    #[error("disposed while batch was in flight")]
    Disposed,
}

impl ErrorCode for TransportError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Transport
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Disconnected => "RPC-T001",
            Self::Timeout { .. } => "RPC-T002",
            Self::QueueOverflow { .. } => "RPC-T003",
            Self::Disposed => "RPC-T004",
        }
    }
}

/// Wire codec failed to encode or decode a value.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializationError {
    /// The value graph referenced an `objects[]` index that does not exist.
    #[error("dangling reference: objects[{index}] does not exist")]
    DanglingReference {
        /// Offending index.
        index: usize,
    },
    /// A value that cannot be represented on the wire was encountered (e.g. a symbol).
    #[error("unsupported value encountered: {kind}")]
    UnsupportedValue {
        /// Description of what was found.
        kind: String,
    },
    /// A tagged tuple carried an unrecognized type tag.
    #[error("unknown wire type tag: {tag}")]
    UnknownTag {
        /// The offending tag string.
        tag: String,
    },
    /// The wire format's major version is not compatible with this implementation.
    #[error("incompatible wire format version: got {got}, expected {expected}")]
    IncompatibleVersion {
        /// Version carried by the message.
        got: u32,
        /// Version this implementation expects.
        expected: u32,
    },
    /// A body (e.g. a `Request`/`Response` stream) was read more than once.
    #[error("body already consumed")]
    BodyAlreadyConsumed,
}

impl ErrorCode for SerializationError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Serialization
    }

    fn code(&self) -> &'static str {
        match self {
            Self::DanglingReference { .. } => "RPC-S001",
            Self::UnsupportedValue { .. } => "RPC-S002",
            Self::UnknownTag { .. } => "RPC-S003",
            Self::IncompatibleVersion { .. } => "RPC-S004",
            Self::BodyAlreadyConsumed => "RPC-S005",
        }
    }
}

/// The single error type that crosses crate boundaries and the wire.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RpcError {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`ReplayError`].
    #[error(transparent)]
    Replay(#[from] ReplayError),
    /// See [`UserError`].
    #[error(transparent)]
    User(#[from] UserError),
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`SerializationError`].
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl RpcError {
    /// Stable error code for whichever variant is wrapped.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::Replay(e) => e.code(),
            Self::User(e) => e.code(),
            Self::Transport(e) => e.code(),
            Self::Serialization(e) => e.code(),
        }
    }

    /// Broad category for whichever variant is wrapped.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(e) => e.category(),
            Self::Replay(e) => e.category(),
            Self::User(e) => e.category(),
            Self::Transport(e) => e.category(),
            Self::Serialization(e) => e.category(),
        }
    }

    /// Convert into the serializable wire form sent to the client.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        if let Self::User(u) = self {
            return u.to_payload();
        }
        ErrorPayload {
            code: self.code().to_string(),
            category: self.category(),
            name: "Error".to_string(),
            message: self.to_string(),
            stack: None,
            cause: None,
            custom: Vec::new(),
        }
    }
}

/// Serializable error record sent to the client, preserving `name`,
/// `message`, `stack`, `cause`, and `custom` enumerable properties the way a
/// thrown target error would.
///
/// # Examples
///
/// ```
/// use chainrpc_error::{ErrorPayload, ErrorCategory, RpcError, ValidationError};
///
/// let err: RpcError = ValidationError::ChainTooDeep { depth: 51, max: 50 }.into();
/// let payload: ErrorPayload = err.to_payload();
/// assert_eq!(payload.code, "RPC-V001");
/// assert_eq!(payload.category, ErrorCategory::Validation);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    /// Stable error code, e.g. `"RPC-V001"`.
    pub code: String,
    /// Broad category.
    pub category: ErrorCategory,
    /// `Error.name`-equivalent.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Optional stack-trace-equivalent text.
    pub stack: Option<String>,
    /// Optional nested cause payload.
    pub cause: Option<Box<ErrorPayload>>,
    /// Custom enumerable properties beyond name/message/stack/cause, e.g. a
    /// thrown error's `code`, `statusCode`, or `metadata`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<(String, serde_json::Value)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_codes_are_unique_and_categorised() {
        let errs = [
            ValidationError::ChainTooDeep { depth: 51, max: 50 },
            ValidationError::TooManyArguments { count: 101, max: 100 },
            ValidationError::EmptyChain,
            ValidationError::MalformedRoute,
            ValidationError::ChainMustStartWithGet,
        ];
        let mut codes = std::collections::HashSet::new();
        for e in &errs {
            assert_eq!(e.category(), ErrorCategory::Validation);
            assert!(codes.insert(e.code()));
        }
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn chain_too_deep_message_matches_scenario_wording() {
        let e = ValidationError::ChainTooDeep { depth: 51, max: 50 };
        let msg = e.to_string();
        assert!(msg.contains("too deep"), "message was: {msg}");
        assert!(msg.contains("51 > 50"), "message was: {msg}");
    }

    #[test]
    fn too_many_arguments_message_matches_scenario_wording() {
        let e = ValidationError::TooManyArguments { count: 101, max: 100 };
        let msg = e.to_string();
        assert!(msg.contains("Too many arguments"), "message was: {msg}");
        assert!(msg.contains("101 > 100"), "message was: {msg}");
    }

    #[test]
    fn rpc_error_from_conversions_preserve_code() {
        let e: RpcError = TransportError::Disconnected.into();
        assert_eq!(e.code(), "RPC-T001");
        assert_eq!(e.category(), ErrorCategory::Transport);
    }

    #[test]
    fn user_error_payload_preserves_name_and_stack() {
        let e: RpcError = UserError {
            name: "RangeError".into(),
            message: "out of range".into(),
            stack: Some("at foo (bar.js:1:1)".into()),
            cause: None,
            custom: Vec::new(),
        }
        .into();
        let payload = e.to_payload();
        assert_eq!(payload.name, "RangeError");
        assert_eq!(payload.stack.as_deref(), Some("at foo (bar.js:1:1)"));
        assert_eq!(payload.code, "RPC-U001");
    }

    #[test]
    fn user_error_payload_preserves_cause_and_custom_properties() {
        let cause = UserError::new("Error", "underlying failure");
        let e: RpcError = UserError {
            name: "Error".into(),
            message: "nope".into(),
            stack: None,
            cause: Some(Box::new(cause)),
            custom: vec![
                ("code".to_string(), serde_json::json!("E_NOPE")),
                ("statusCode".to_string(), serde_json::json!(409)),
                ("metadata".to_string(), serde_json::json!({"retryable": false})),
            ],
        }
        .into();
        let payload = e.to_payload();
        assert_eq!(payload.message, "nope");
        assert_eq!(payload.cause.as_ref().map(|c| c.message.as_str()), Some("underlying failure"));
        assert_eq!(
            payload.custom,
            vec![
                ("code".to_string(), serde_json::json!("E_NOPE")),
                ("statusCode".to_string(), serde_json::json!(409)),
                ("metadata".to_string(), serde_json::json!({"retryable": false})),
            ]
        );
    }

    #[test]
    fn error_payload_serde_roundtrip() {
        let e: RpcError = SerializationError::UnknownTag { tag: "bogus".into() }.into();
        let payload = e.to_payload();
        let json = serde_json::to_string(&payload).unwrap();
        let back: ErrorPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn error_category_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
    }
}
