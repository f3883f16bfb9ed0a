//! In-process graph store.
//!
//! Holds every node with its per-field merge stamps and fans change events
//! out to subscribers. The relay serves one of these over WebSocket; tests
//! drive one directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use anontalk_shared::{GraphPath, Node};

use crate::client::{GraphClient, GraphEvent, PeerEvent, Scope, Subscription};
use crate::error::{GraphError, Result};
use crate::state::{self, StampedFields, StateClock};

const PEER_EVENT_CAPACITY: usize = 64;

struct Subscriber {
    path: GraphPath,
    scope: Scope,
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl Subscriber {
    fn matches(&self, changed: &GraphPath) -> bool {
        match self.scope {
            Scope::Node => &self.path == changed,
            Scope::Children => changed.is_child_of(&self.path),
        }
    }
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<GraphPath, StampedFields>,
    children: HashMap<GraphPath, BTreeSet<String>>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
}

struct Inner {
    state: Mutex<GraphState>,
    clock: StateClock,
    peers: broadcast::Sender<PeerEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle on an in-process graph. Clones see the same data.
#[derive(Clone)]
pub struct MemoryGraph {
    inner: Arc<Inner>,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        let (peers, _) = broadcast::channel(PEER_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GraphState::default()),
                clock: StateClock::new(),
                peers,
            }),
        }
    }

    /// Merge already-stamped fields into the node at `path`.
    ///
    /// Returns whether anything changed. Subscribers are notified only on
    /// change. Account nodes (paths starting with `~`) are write-once per
    /// field: a write that would change an existing value is rejected.
    pub fn apply_stamped(&self, path: &GraphPath, fields: StampedFields) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }

        let mut graph = self.inner.lock();

        if is_account_path(path) {
            if let Some(existing) = graph.nodes.get(path) {
                let conflict = fields.iter().find(|(field, incoming)| {
                    existing
                        .get(*field)
                        .is_some_and(|current| current.value != incoming.value)
                });
                if let Some((field, _)) = conflict {
                    debug!(path = %path, field = %field, "Rejected overwrite of account record");
                    return Err(GraphError::Rejected(format!(
                        "{path} is already claimed"
                    )));
                }
            }
        }

        let stored = graph.nodes.entry(path.clone()).or_default();
        if !state::merge(stored, fields) {
            return Ok(false);
        }
        let node = state::materialize(stored);

        if let Some(parent) = path.parent() {
            graph
                .children
                .entry(parent)
                .or_default()
                .insert(path.key().to_string());
        }

        let event = GraphEvent {
            path: path.clone(),
            key: path.key().to_string(),
            node: Some(node),
        };
        let mut closed = Vec::new();
        for (id, subscriber) in &graph.subscribers {
            if subscriber.matches(path) && subscriber.tx.send(event.clone()).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            graph.subscribers.remove(&id);
        }

        trace!(path = %path, "Node updated");
        Ok(true)
    }

    /// Current value of a node without going through the async surface.
    pub fn snapshot(&self, path: &GraphPath) -> Option<Node> {
        let graph = self.inner.lock();
        graph.nodes.get(path).map(state::materialize)
    }

    /// Current values of the direct children of `path`, ordered by key.
    pub fn snapshot_children(&self, path: &GraphPath) -> Vec<(String, Node)> {
        let graph = self.inner.lock();
        let Some(keys) = graph.children.get(path) else {
            return Vec::new();
        };
        keys.iter()
            .filter_map(|key| {
                graph
                    .nodes
                    .get(&path.child(key))
                    .map(|fields| (key.clone(), state::materialize(fields)))
            })
            .collect()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Publish a peer connect/disconnect to `peer_events` listeners.
    pub fn notify_peer(&self, event: PeerEvent) {
        // No listeners is fine.
        let _ = self.inner.peers.send(event);
    }

    /// Register a subscriber and replay what the store already holds, under
    /// one lock so no concurrent write can slip between the two.
    pub fn subscribe(&self, path: &GraphPath, scope: Scope) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut graph = self.inner.lock();

        match scope {
            Scope::Node => {
                if let Some(fields) = graph.nodes.get(path) {
                    let _ = tx.send(GraphEvent {
                        path: path.clone(),
                        key: path.key().to_string(),
                        node: Some(state::materialize(fields)),
                    });
                }
            }
            Scope::Children => {
                if let Some(keys) = graph.children.get(path) {
                    for key in keys {
                        let child = path.child(key);
                        if let Some(fields) = graph.nodes.get(&child) {
                            let _ = tx.send(GraphEvent {
                                path: child.clone(),
                                key: key.clone(),
                                node: Some(state::materialize(fields)),
                            });
                        }
                    }
                }
            }
        }

        let id = graph.next_subscriber;
        graph.next_subscriber += 1;
        graph.subscribers.insert(
            id,
            Subscriber {
                path: path.clone(),
                scope,
                tx,
            },
        );
        drop(graph);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().subscribers.remove(&id);
            }
        })
    }
}

impl GraphClient for MemoryGraph {
    async fn put(&self, path: &GraphPath, node: Node) -> Result<()> {
        let fields = self.inner.clock.stamp(node);
        self.apply_stamped(path, fields).map(|_| ())
    }

    async fn once(&self, path: &GraphPath) -> Result<Option<Node>> {
        Ok(self.snapshot(path))
    }

    async fn once_children(&self, path: &GraphPath) -> Result<Vec<(String, Node)>> {
        Ok(self.snapshot_children(path))
    }

    fn on(&self, path: &GraphPath) -> Subscription {
        self.subscribe(path, Scope::Node)
    }

    fn map_on(&self, path: &GraphPath) -> Subscription {
        self.subscribe(path, Scope::Children)
    }

    fn peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.peers.subscribe()
    }
}

fn is_account_path(path: &GraphPath) -> bool {
    path.as_str().starts_with('~')
}
