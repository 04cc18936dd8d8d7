//! Property-based tests for `OperationChain::validate_shape`.

use chainrpc_core::value::Value;
use chainrpc_core::{Operation, OperationChain};
use chainrpc_error::ValidationError;
use proptest::prelude::*;

fn chain_of_depth(depth: usize) -> OperationChain {
    let mut chain = OperationChain::new();
    for i in 0..depth {
        chain = chain.then(Operation::get(format!("p{i}")));
    }
    chain
}

proptest! {
    /// Any chain whose depth is within the limit, and starts with a Get,
    /// always passes shape validation regardless of the limit's exact value.
    #[test]
    fn within_limits_always_passes(depth in 1usize..=50, max_depth in 50usize..=200) {
        let chain = chain_of_depth(depth);
        prop_assert!(chain.validate_shape(max_depth, 100).is_ok());
    }

    /// Any chain deeper than `max_depth` always fails with `ChainTooDeep`
    /// carrying the exact observed depth and limit.
    #[test]
    fn over_depth_always_rejected(max_depth in 1usize..=50, overshoot in 1usize..=20) {
        let depth = max_depth + overshoot;
        let chain = chain_of_depth(depth);
        prop_assert_eq!(
            chain.validate_shape(max_depth, 100),
            Err(ValidationError::ChainTooDeep { depth, max: max_depth })
        );
    }

    /// Any `Apply` step whose argument count exceeds `max_args` always fails
    /// with `TooManyArguments` carrying the exact observed count and limit.
    #[test]
    fn over_arg_count_always_rejected(max_args in 1usize..=100, overshoot in 1usize..=20) {
        let count = max_args + overshoot;
        let chain = OperationChain::new()
            .then(Operation::get("fn"))
            .then(Operation::apply(vec![Value::Number(0.0); count]));
        prop_assert_eq!(
            chain.validate_shape(50, max_args),
            Err(ValidationError::TooManyArguments { count, max: max_args })
        );
    }
}
