//! [`ReplayTarget`] is the seam between the chain executor and whatever
//! durable-object host is actually running — the executor never touches a
//! concrete backend type, only this trait.

use crate::value::{Encoded, Graph, Value};
use async_trait::async_trait;
use chainrpc_error::RpcError;

/// A replayable remote object. Property reads resolve by name; method calls
/// resolve by the name the property read produced. Rust has no runtime
/// reflection, so unlike a JS prototype chain, a `ReplayTarget` is
/// responsible for naming every reachable method — including ones nested
/// inside objects it returns from `get` — flatly, by string.
///
/// Implementors typically back this with a small property table plus a
/// method dispatch table; see the `Counter` test double in
/// `chainrpc-transport` for the reference shape.
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    /// Read a property by name off the target's root.
    ///
    /// Returns `Value::Undefined` (wrapped as a scalar [`Encoded`]) for an
    /// absent property — a `Get` of an undefined property is legal and only
    /// fails later if something then tries to `Apply` it.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcError`] if the underlying target cannot service the
    /// read (e.g. it requires state that is unavailable).
    async fn get(&self, key: &str) -> Result<Encoded, RpcError>;

    /// Invoke a previously read method by name.
    ///
    /// `method` is always a name this target itself produced from a prior
    /// `get` (or from a nested object it returned) — the target owns its own
    /// flat namespace of callable members.
    ///
    /// `args` may contain [`Value::Ref`]s; `graph` is the table they resolve
    /// against (the executor hands in the calling chain's argument graph,
    /// already merged with any resolved nested-operation markers).
    ///
    /// # Errors
    ///
    /// Returns [`chainrpc_error::ReplayError::NotAFunction`] if `method`
    /// does not name a callable member, or a [`chainrpc_error::UserError`]
    /// if the underlying call threw.
    async fn call(&self, method: &str, args: Vec<Value>, graph: &Graph) -> Result<Encoded, RpcError>;

    /// Own enumerable non-method property names, for `__asObject`.
    fn property_names(&self) -> Vec<String>;

    /// Own callable member names, for `__asObject`.
    fn method_names(&self) -> Vec<String>;

    /// Pivot into the per-process environment registry instead of this
    /// target's own root, for a chain whose very first operation is
    /// `Get { key: "env" }` (spec §4.2).
    ///
    /// The env registry itself is a host-runtime binding excluded as an
    /// external collaborator (spec §1) — this crate only defines the seam.
    /// The default implementation returns `Ok(None)`, meaning "this target
    /// has no env registry"; the executor falls back to an ordinary
    /// `get("env")` against the target in that case, so targets that don't
    /// bind an environment are unaffected.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcError`] if a target that *does* expose an env
    /// registry fails to read `key` from it.
    async fn env(&self, _key: &str) -> Result<Option<Encoded>, RpcError> {
        Ok(None)
    }
}
