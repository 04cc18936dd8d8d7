//! Marker types that travel inside argument and result values:
//! [`NestedOperationMarker`] lets OCAN send a reference to an unresolved
//! proxy instead of re-sending its whole chain, and [`RemoteFunctionMarker`]
//! lets the executor hand back a function result the client can call again.
//!
//! Both are plain data here — [`chainrpc_codec`] owns the conversion to and
//! from the wire's object-tuple shape, using the reserved key names below so
//! every crate agrees on them without duplicating string literals.

use crate::operation::OperationChain;

/// Reserved object key carrying a [`NestedOperationMarker`]'s [`RefId`].
pub const REF_ID_KEY: &str = "__refId";
/// Reserved object key carrying a [`NestedOperationMarker`]'s trailing chain.
pub const OPERATION_CHAIN_KEY: &str = "__operationChain";
/// Reserved object key marking a plain object as a [`RemoteFunctionMarker`].
pub const REMOTE_FUNCTION_KEY: &str = "__isRemoteFunction";
/// Reserved object key carrying a [`RemoteFunctionMarker`]'s display name.
pub const REMOTE_FUNCTION_NAME_KEY: &str = "name";

/// Identifies one proxy lineage within a single batch. Two arguments in the
/// same batch carrying the same `RefId` name the same underlying proxy —
/// the second occurrence omits its chain, relying on the first's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub u64);

impl RefId {
    /// Construct a `RefId` from a raw batch-scoped counter value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Substituted in place of a repeated proxy argument. The first occurrence
/// of a given proxy within a batch carries `chain: Some(..)`; every later
/// occurrence in the same batch carries `chain: None` and is resolved from
/// the executor's per-batch memo by `ref_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedOperationMarker {
    /// Identifies which proxy this marker names, within the current batch.
    pub ref_id: RefId,
    /// The proxy's recorded chain, present only on the first occurrence.
    pub chain: Option<OperationChain>,
}

impl NestedOperationMarker {
    /// Construct the first occurrence of a proxy within a batch (carries its chain).
    #[must_use]
    pub fn first(ref_id: RefId, chain: OperationChain) -> Self {
        Self {
            ref_id,
            chain: Some(chain),
        }
    }

    /// Construct a later occurrence of an already-seen proxy (alias only).
    #[must_use]
    pub fn alias(ref_id: RefId) -> Self {
        Self {
            ref_id,
            chain: None,
        }
    }
}

/// A function value returned from chain replay, enriched with the chain
/// needed to call it again: `target.<chain-so-far>.<name>`. Produced by the
/// executor's post-processing pass (step 5), never by the wire codec alone.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFunctionMarker {
    /// Display name, typically the property name the function was read from.
    pub name: String,
    /// Chain required to invoke this function again, relative to the root
    /// target. `None` if the function cannot be re-invoked remotely (already
    /// fully applied, or the target declined to expose a chain for it).
    pub chain: Option<OperationChain>,
}

impl RemoteFunctionMarker {
    /// Construct a marker for a reachable function.
    #[must_use]
    pub fn new(name: impl Into<String>, chain: OperationChain) -> Self {
        Self {
            name: name.into(),
            chain: Some(chain),
        }
    }

    /// Construct a marker for a function with no known re-invocation chain.
    #[must_use]
    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    #[test]
    fn first_occurrence_carries_chain_alias_does_not() {
        let chain = OperationChain::new().then(Operation::get("a"));
        let first = NestedOperationMarker::first(RefId::new(1), chain.clone());
        let alias = NestedOperationMarker::alias(RefId::new(1));
        assert_eq!(first.ref_id, alias.ref_id);
        assert!(first.chain.is_some());
        assert!(alias.chain.is_none());
    }

    #[test]
    fn remote_function_marker_reachability() {
        let chain = OperationChain::new().then(Operation::get("increment"));
        let reachable = RemoteFunctionMarker::new("increment", chain);
        let unreachable = RemoteFunctionMarker::unreachable("increment");
        assert!(reachable.chain.is_some());
        assert!(unreachable.chain.is_none());
    }
}
