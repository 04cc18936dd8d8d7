// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-router
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Parses the two URL shapes ChainRPC recognizes —
//! `{prefix}/{binding}/{instance}/call` (HTTP batch POST) and
//! `{prefix}/{binding}/{instance}` (WebSocket upgrade) — and leaves every
//! other path alone so a host application's own router can handle it.
//!
//! This crate knows nothing about HTTP frameworks or sockets; it is pure
//! string matching, shared by [`chainrpc_transport`](https://docs.rs/chainrpc-transport)
//! and anything else that needs to recognize a ChainRPC route before
//! dispatching to [`chainrpc_executor`](https://docs.rs/chainrpc-executor).

use chainrpc_error::ValidationError;

/// The trailing path segment that marks an HTTP batch-call route.
const CALL_SEGMENT: &str = "call";

/// Configuration for route recognition: just the leading prefix segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Leading path segment identifying ChainRPC routes, e.g. `"__rpc"`.
    pub prefix: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            prefix: chainrpc_core::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// A recognized ChainRPC route, naming the durable-object binding and
/// instance key it addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `{prefix}/{binding}/{instance}/call` — one HTTP batch request.
    Call {
        /// Durable-object binding name.
        binding: String,
        /// Instance key within that binding.
        instance: String,
    },
    /// `{prefix}/{binding}/{instance}` — a WebSocket upgrade request.
    Upgrade {
        /// Durable-object binding name.
        binding: String,
        /// Instance key within that binding.
        instance: String,
    },
}

impl Route {
    /// The binding name this route addresses, regardless of variant.
    #[must_use]
    pub fn binding(&self) -> &str {
        match self {
            Self::Call { binding, .. } | Self::Upgrade { binding, .. } => binding,
        }
    }

    /// The instance key this route addresses, regardless of variant.
    #[must_use]
    pub fn instance(&self) -> &str {
        match self {
            Self::Call { instance, .. } | Self::Upgrade { instance, .. } => instance,
        }
    }
}

/// Outcome of matching one request's method and path against [`RouteConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The path matched a ChainRPC route shape with an acceptable method.
    Matched(Route),
    /// The path matched the `/call` route shape but the method was not
    /// `POST` — callers should respond 405, not fall through to their own
    /// router (per spec: only `POST` is meaningful to a batch-call route).
    MethodNotAllowed,
    /// The path does not match any ChainRPC route shape at all; a caller
    /// should fall through to its own routing.
    NoMatch,
}

/// Match an inbound request's method and path against `config`.
///
/// `method` is compared case-insensitively (`"POST"`/`"post"` both work).
/// Path segments are matched exactly; an empty binding or instance segment
/// (e.g. `"__rpc//x/call"`) is rejected as [`RouteOutcome::NoMatch`] rather
/// than accepted with an empty string.
#[must_use]
pub fn route(config: &RouteConfig, method: &str, path: &str) -> RouteOutcome {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let [prefix, binding, rest @ ..] = segments.as_slice() else {
        return RouteOutcome::NoMatch;
    };
    if *prefix != config.prefix || binding.is_empty() {
        return RouteOutcome::NoMatch;
    }

    match rest {
        [instance] if !instance.is_empty() => RouteOutcome::Matched(Route::Upgrade {
            binding: (*binding).to_string(),
            instance: (*instance).to_string(),
        }),
        [instance, call] if !instance.is_empty() && *call == CALL_SEGMENT => {
            if method.eq_ignore_ascii_case("POST") {
                RouteOutcome::Matched(Route::Call {
                    binding: (*binding).to_string(),
                    instance: (*instance).to_string(),
                })
            } else {
                RouteOutcome::MethodNotAllowed
            }
        }
        _ => RouteOutcome::NoMatch,
    }
}

/// Parse `{binding}/{instance}` segments out of an already-stripped-prefix
/// path, for callers that parsed the prefix themselves. Used by
/// [`chainrpc_executor`] error messages that want to name the offending
/// path without re-deriving [`RouteConfig`].
///
/// # Errors
///
/// Returns [`ValidationError::MalformedRoute`] if `path` doesn't contain at
/// least a binding and instance segment.
pub fn require_binding_instance(path: &str) -> Result<(String, String), ValidationError> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let binding = segments.next().ok_or(ValidationError::MalformedRoute)?;
    let instance = segments.next().ok_or(ValidationError::MalformedRoute)?;
    Ok((binding.to_string(), instance.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouteConfig {
        RouteConfig { prefix: "__rpc".to_string() }
    }

    #[test]
    fn call_route_matches_post() {
        assert_eq!(
            route(&config(), "POST", "/__rpc/counter/abc/call"),
            RouteOutcome::Matched(Route::Call { binding: "counter".into(), instance: "abc".into() })
        );
    }

    #[test]
    fn call_route_rejects_get_with_method_not_allowed() {
        assert_eq!(
            route(&config(), "GET", "/__rpc/counter/abc/call"),
            RouteOutcome::MethodNotAllowed
        );
    }

    #[test]
    fn upgrade_route_matches_any_method_shape() {
        assert_eq!(
            route(&config(), "GET", "/__rpc/counter/abc"),
            RouteOutcome::Matched(Route::Upgrade { binding: "counter".into(), instance: "abc".into() })
        );
    }

    #[test]
    fn unrelated_path_falls_through() {
        assert_eq!(route(&config(), "GET", "/health"), RouteOutcome::NoMatch);
        assert_eq!(route(&config(), "GET", "/__rpc"), RouteOutcome::NoMatch);
        assert_eq!(route(&config(), "GET", "/other/counter/abc/call"), RouteOutcome::NoMatch);
    }

    #[test]
    fn extra_trailing_segments_do_not_match() {
        assert_eq!(
            route(&config(), "POST", "/__rpc/counter/abc/call/extra"),
            RouteOutcome::NoMatch
        );
    }

    #[test]
    fn method_comparison_is_case_insensitive() {
        assert!(matches!(
            route(&config(), "post", "/__rpc/counter/abc/call"),
            RouteOutcome::Matched(Route::Call { .. })
        ));
    }

    #[test]
    fn require_binding_instance_parses_two_segments() {
        assert_eq!(
            require_binding_instance("counter/abc"),
            Ok(("counter".to_string(), "abc".to_string()))
        );
        assert_eq!(require_binding_instance("counter"), Err(ValidationError::MalformedRoute));
    }
}
