//! The store surface the chat core consumes.
//!
//! Everything above this crate talks to the graph only through
//! [`GraphClient`], so the same presence, channel and message logic runs
//! against the in-process [`MemoryGraph`](crate::MemoryGraph) in tests and
//! against a relay through [`RemoteGraph`](crate::RemoteGraph).

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use anontalk_shared::{GraphPath, Node};

use crate::error::Result;

/// A change notification delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEvent {
    /// Full path of the node that changed.
    pub path: GraphPath,
    /// Last segment of `path`: the child key for `map_on` subscriptions.
    pub key: String,
    /// Merged value of the node after the change. `None` only when a store
    /// reports an explicit null.
    pub node: Option<Node>,
}

/// What a subscription watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The node at the path itself (`get(path).on`).
    Node,
    /// Every direct child of the path (`get(path).map().on`).
    Children,
}

/// Connection-level notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected { peer_id: String },
    Disconnected { peer_id: String },
}

/// Live handle on a subscription.
///
/// Events arrive in the order the store emits them, which is not a causal
/// order. Dropping the handle detaches it; after detaching no further event
/// is observable.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<GraphEvent>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<GraphEvent>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            detach: Some(Box::new(detach)),
        }
    }

    /// Next event, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<GraphEvent> {
        self.events.recv().await
    }

    /// Next already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<GraphEvent> {
        self.events.try_recv().ok()
    }

    /// Unregister from the store and discard anything still queued.
    pub fn detach(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// A replicated, eventually-consistent graph store.
///
/// Writes merge field by field with last-write-wins. Subscriptions fire once
/// per existing value and again on every later change, including changes
/// made by this client. No ordering or exactly-once guarantee is given.
pub trait GraphClient: Clone + Send + Sync + 'static {
    /// Merge `node` into the node at `path`. Resolves once the store has
    /// acknowledged (or rejected) the write.
    fn put(&self, path: &GraphPath, node: Node) -> impl Future<Output = Result<()>> + Send;

    /// Current value of the node at `path`, if it exists.
    fn once(&self, path: &GraphPath) -> impl Future<Output = Result<Option<Node>>> + Send;

    /// Current value of every direct child of `path`, keyed by child key.
    fn once_children(
        &self,
        path: &GraphPath,
    ) -> impl Future<Output = Result<Vec<(String, Node)>>> + Send;

    /// Subscribe to the node at `path`.
    fn on(&self, path: &GraphPath) -> Subscription;

    /// Subscribe to every direct child of `path`.
    fn map_on(&self, path: &GraphPath) -> Subscription;

    /// Peer connect/disconnect notifications.
    fn peer_events(&self) -> broadcast::Receiver<PeerEvent>;
}
