//! The operation vocabulary — a chain is nothing more than an ordered list
//! of property reads and function calls, recorded client-side and replayed
//! server-side in strict sequence.

use crate::value::{Encoded, Graph, Value};
use chainrpc_error::ValidationError;

/// A single step in an [`OperationChain`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read a property by name off the current value.
    Get {
        /// Property name.
        key: String,
    },
    /// Call the current value as a function with the given arguments.
    Apply {
        /// Argument values. `Ref`s resolve against the owning
        /// [`OperationChain`]'s [`Graph`].
        args: Vec<Value>,
    },
}

impl Operation {
    /// Construct a `Get` step.
    #[must_use]
    pub fn get(key: impl Into<String>) -> Self {
        Self::Get { key: key.into() }
    }

    /// Construct an `Apply` step.
    #[must_use]
    pub fn apply(args: Vec<Value>) -> Self {
        Self::Apply { args }
    }

    /// Returns `true` if this step is a `Get`.
    #[must_use]
    pub fn is_get(&self) -> bool {
        matches!(self, Self::Get { .. })
    }
}

/// An ordered sequence of [`Operation`]s recorded against one proxy lineage,
/// plus the shared [`Graph`] its `Apply` arguments' `Ref`s resolve against.
///
/// Every chain must begin with a `Get` (the initial property pivot off the
/// target) per the replay semantics; an empty chain or one starting with
/// `Apply` fails validation rather than replay.
///
/// # Examples
///
/// ```
/// use chainrpc_core::{Operation, OperationChain};
/// use chainrpc_core::value::Value;
///
/// let chain = OperationChain::new()
///     .then(Operation::get("counter"))
///     .then(Operation::get("increment"))
///     .then(Operation::apply(vec![Value::Number(5.0)]));
///
/// assert_eq!(chain.len(), 3);
/// assert!(chain.validate_shape(50, 100).is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationChain {
    /// The recorded steps, in replay order.
    pub operations: Vec<Operation>,
    /// Graph shared by every `Apply` argument's `Ref`s in this chain.
    pub graph: Graph,
}

impl OperationChain {
    /// Construct an empty chain with an empty argument graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, builder-style.
    #[must_use]
    pub fn then(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Largest argument-list length across this chain's `Apply` steps.
    #[must_use]
    pub fn max_arg_count(&self) -> usize {
        self.operations
            .iter()
            .map(|op| match op {
                Operation::Apply { args } => args.len(),
                Operation::Get { .. } => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Validate the chain's shape against depth and per-call argument-count
    /// limits. Does not touch the target — this is the shared check used by
    /// both the client (fail fast) and the server (authoritative).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyChain`], [`ValidationError::ChainMustStartWithGet`],
    /// [`ValidationError::ChainTooDeep`], or [`ValidationError::TooManyArguments`].
    pub fn validate_shape(&self, max_depth: usize, max_args: usize) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyChain);
        }
        if !self.operations[0].is_get() {
            return Err(ValidationError::ChainMustStartWithGet);
        }
        if self.len() > max_depth {
            return Err(ValidationError::ChainTooDeep {
                depth: self.len(),
                max: max_depth,
            });
        }
        let widest = self.max_arg_count();
        if widest > max_args {
            return Err(ValidationError::TooManyArguments {
                count: widest,
                max: max_args,
            });
        }
        Ok(())
    }

    /// Resolve an `Apply` step's argument at `index` into a standalone
    /// [`Encoded`] value paired with this chain's graph.
    #[must_use]
    pub fn resolve_arg(&self, value: &Value) -> Encoded {
        Encoded {
            root: value.clone(),
            graph: self.graph.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_fails_validation() {
        let chain = OperationChain::new();
        assert_eq!(
            chain.validate_shape(50, 100),
            Err(ValidationError::EmptyChain)
        );
    }

    #[test]
    fn chain_must_start_with_get() {
        let chain = OperationChain::new().then(Operation::apply(vec![]));
        assert_eq!(
            chain.validate_shape(50, 100),
            Err(ValidationError::ChainMustStartWithGet)
        );
    }

    #[test]
    fn depth_limit_enforced() {
        let mut chain = OperationChain::new().then(Operation::get("a"));
        for _ in 0..51 {
            chain = chain.then(Operation::get("b"));
        }
        assert_eq!(
            chain.validate_shape(50, 100),
            Err(ValidationError::ChainTooDeep { depth: 52, max: 50 })
        );
    }

    #[test]
    fn arg_count_limit_enforced() {
        let args = vec![Value::Number(0.0); 101];
        let chain = OperationChain::new()
            .then(Operation::get("fn"))
            .then(Operation::apply(args));
        assert_eq!(
            chain.validate_shape(50, 100),
            Err(ValidationError::TooManyArguments { count: 101, max: 100 })
        );
    }

    #[test]
    fn well_formed_chain_passes() {
        let chain = OperationChain::new()
            .then(Operation::get("counter"))
            .then(Operation::get("increment"))
            .then(Operation::apply(vec![Value::Number(1.0)]));
        assert!(chain.validate_shape(50, 100).is_ok());
    }
}
