//! Two independent registries the transport layer needs: [`TargetResolver`]
//! maps an inbound `(binding, instance)` pair to the durable object that
//! replays its chains, and [`DownstreamRegistry`] maps a client-assigned tag
//! to the sockets currently open for it, for server-initiated pushes.

use axum::extract::ws::Message;
use chainrpc_core::ReplayTarget;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;

/// Resolves an inbound route's `(binding, instance)` pair to the durable
/// object that should replay its chains.
///
/// This is the seam to whatever actually hosts durable instances — a real
/// deployment's resolver looks them up from its own object store; this
/// crate only defines the contract and an in-memory reference
/// implementation.
pub trait TargetResolver: Send + Sync {
    /// Look up the target for `binding`/`instance`, if this server hosts it.
    fn resolve(&self, binding: &str, instance: &str) -> Option<Arc<dyn ReplayTarget>>;
}

/// A name-keyed, in-memory [`TargetResolver`], grounded on the same
/// registry shape a sidecar host uses to track its own named processes.
#[derive(Default)]
pub struct InMemoryResolver {
    targets: RwLock<BTreeMap<(String, String), Arc<dyn ReplayTarget>>>,
}

impl InMemoryResolver {
    /// Construct an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under `(binding, instance)`, replacing any prior
    /// registration for the same key.
    pub fn register(&self, binding: impl Into<String>, instance: impl Into<String>, target: Arc<dyn ReplayTarget>) {
        self.targets
            .write()
            .unwrap()
            .insert((binding.into(), instance.into()), target);
    }

    /// Remove the target registered under `(binding, instance)`, if any.
    pub fn deregister(&self, binding: &str, instance: &str) {
        self.targets
            .write()
            .unwrap()
            .remove(&(binding.to_string(), instance.to_string()));
    }
}

impl TargetResolver for InMemoryResolver {
    fn resolve(&self, binding: &str, instance: &str) -> Option<Arc<dyn ReplayTarget>> {
        self.targets
            .read()
            .unwrap()
            .get(&(binding.to_string(), instance.to_string()))
            .cloned()
    }
}

/// Tag→socket registry for server-initiated downstream messages.
///
/// Multiple sockets may share a tag (a user with several open tabs); a
/// broadcast to that tag delivers to every one of them. Modeled as a plain
/// `RwLock<BTreeMap<Tag, Vec<Sender>>>` rather than a lock-free map — this
/// crate's connection churn doesn't warrant more.
#[derive(Default)]
pub struct DownstreamRegistry {
    sockets: RwLock<BTreeMap<String, Vec<UnboundedSender<Message>>>>,
}

impl DownstreamRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket's sender under `tag`.
    pub fn register(&self, tag: &str, sender: UnboundedSender<Message>) {
        self.sockets
            .write()
            .unwrap()
            .entry(tag.to_string())
            .or_default()
            .push(sender);
    }

    /// Remove a specific socket's sender from `tag`'s list, identified by
    /// comparing the channel's sender pointer.
    pub fn deregister(&self, tag: &str, sender: &UnboundedSender<Message>) {
        let mut guard = self.sockets.write().unwrap();
        if let Some(senders) = guard.get_mut(tag) {
            senders.retain(|s| !s.same_channel(sender));
            if senders.is_empty() {
                guard.remove(tag);
            }
        }
    }

    /// Send `payload` as a text frame to every socket registered under any
    /// of `tags`. Returns how many sends succeeded; a dead sender is
    /// dropped silently since the socket's own read loop will notice the
    /// disconnect and deregister it.
    pub fn broadcast(&self, tags: &[String], payload: String) -> usize {
        let guard = self.sockets.read().unwrap();
        let mut delivered = 0;
        for tag in tags {
            let Some(senders) = guard.get(tag) else { continue };
            for sender in senders {
                if sender.send(Message::Text(payload.clone().into())).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Number of distinct tags with at least one open socket.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.sockets.read().unwrap().len()
    }
}
