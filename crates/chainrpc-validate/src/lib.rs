// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-validate
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Shared chain-shape validation used by both the client (fail fast before
//! sending) and the server (authoritative check at the executor entry
//! point). The hard pass/fail rule lives on [`OperationChain::validate_shape`]
//! itself; this crate wraps it in a configurable [`ChainValidator`] that also
//! surfaces soft warnings — a chain nearing a limit is legal but worth
//! logging — mirroring the errors-plus-warnings shape the rest of the
//! workspace uses for validation.

use chainrpc_core::OperationChain;
use chainrpc_error::{ErrorCode, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fraction of a limit at which [`ChainValidator::validate`] emits a
/// [`ChainWarning::ApproachingLimit`] for a chain that otherwise passes.
const WARN_THRESHOLD: f64 = 0.9;

/// Depth and argument-count limits enforced on every [`OperationChain`].
///
/// Defaults match spec: `max_depth = 50`, `max_args = 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLimits {
    /// Maximum number of operations a chain may contain.
    pub max_depth: usize,
    /// Maximum number of arguments a single `Apply` step may carry.
    pub max_args: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_depth: chainrpc_core::DEFAULT_MAX_DEPTH,
            max_args: chainrpc_core::DEFAULT_MAX_ARGS,
        }
    }
}

/// A non-fatal observation about an otherwise-valid chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainWarning {
    /// The chain's depth or widest argument list is within the configured
    /// limit but above [`WARN_THRESHOLD`] of it.
    ApproachingLimit {
        /// Which dimension is close to its limit.
        dimension: LimitDimension,
        /// Observed value.
        observed: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Which [`ValidationLimits`] field a [`ChainWarning`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDimension {
    /// Refers to [`ValidationLimits::max_depth`].
    Depth,
    /// Refers to [`ValidationLimits::max_args`].
    Args,
}

/// Outcome of validating one chain: the hard pass/fail plus any warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainValidationReport {
    /// `Ok(())` if the chain may proceed to replay; `Err` names the first
    /// violated rule.
    pub result: Result<(), ValidationError>,
    /// Soft warnings, present regardless of `result`.
    pub warnings: Vec<ChainWarning>,
}

impl ChainValidationReport {
    /// `true` if [`Self::result`] is `Ok`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.result.is_ok()
    }
}

/// Validates [`OperationChain`]s against a configured [`ValidationLimits`].
#[derive(Debug, Clone, Default)]
pub struct ChainValidator {
    limits: ValidationLimits,
}

impl ChainValidator {
    /// Construct a validator with the given limits.
    #[must_use]
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// The limits this validator enforces.
    #[must_use]
    pub fn limits(&self) -> ValidationLimits {
        self.limits
    }

    /// Validate one chain's shape, returning both the hard verdict and any
    /// soft warnings. Logs a `tracing::warn!` for the hard-failure case so
    /// server-side rejections are visible without inspecting the response.
    #[must_use]
    pub fn validate(&self, chain: &OperationChain) -> ChainValidationReport {
        let result = chain.validate_shape(self.limits.max_depth, self.limits.max_args);
        if let Err(ref e) = result {
            warn!(error = %e, code = %e.code(), "chain rejected by validation");
        }

        let mut warnings = Vec::new();
        if result.is_ok() {
            let depth = chain.len();
            if exceeds_threshold(depth, self.limits.max_depth) {
                warnings.push(ChainWarning::ApproachingLimit {
                    dimension: LimitDimension::Depth,
                    observed: depth,
                    limit: self.limits.max_depth,
                });
            }
            let widest = chain.max_arg_count();
            if exceeds_threshold(widest, self.limits.max_args) {
                warnings.push(ChainWarning::ApproachingLimit {
                    dimension: LimitDimension::Args,
                    observed: widest,
                    limit: self.limits.max_args,
                });
            }
        }

        ChainValidationReport { result, warnings }
    }
}

fn exceeds_threshold(observed: usize, limit: usize) -> bool {
    limit > 0 && (observed as f64) >= (limit as f64) * WARN_THRESHOLD
}

/// Convenience wrapper around [`OperationChain::validate_shape`] for callers
/// that don't need a [`ChainValidator`] instance or its warnings.
///
/// # Errors
///
/// Returns the same [`ValidationError`] variants as
/// [`OperationChain::validate_shape`].
pub fn validate_chain(chain: &OperationChain, limits: ValidationLimits) -> Result<(), ValidationError> {
    chain.validate_shape(limits.max_depth, limits.max_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrpc_core::Operation;

    fn chain_of_depth(n: usize) -> OperationChain {
        let mut chain = OperationChain::new();
        for i in 0..n {
            chain = chain.then(Operation::get(format!("p{i}")));
        }
        chain
    }

    #[test]
    fn default_limits_match_spec() {
        let limits = ValidationLimits::default();
        assert_eq!(limits.max_depth, 50);
        assert_eq!(limits.max_args, 100);
    }

    #[test]
    fn well_formed_chain_has_no_warnings() {
        let validator = ChainValidator::default();
        let chain = chain_of_depth(3);
        let report = validator.validate(&chain);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn chain_near_depth_limit_warns_but_passes() {
        let validator = ChainValidator::new(ValidationLimits { max_depth: 10, max_args: 100 });
        let chain = chain_of_depth(9);
        let report = validator.validate(&chain);
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![ChainWarning::ApproachingLimit {
                dimension: LimitDimension::Depth,
                observed: 9,
                limit: 10,
            }]
        );
    }

    #[test]
    fn over_limit_chain_fails_with_no_warnings_needed() {
        let validator = ChainValidator::new(ValidationLimits { max_depth: 5, max_args: 100 });
        let chain = chain_of_depth(6);
        let report = validator.validate(&chain);
        assert_eq!(report.result, Err(ValidationError::ChainTooDeep { depth: 6, max: 5 }));
    }

    #[test]
    fn convenience_function_matches_validator() {
        let limits = ValidationLimits { max_depth: 2, max_args: 100 };
        let chain = chain_of_depth(3);
        assert_eq!(
            validate_chain(&chain, limits),
            Err(ValidationError::ChainTooDeep { depth: 3, max: 2 })
        );
    }
}
