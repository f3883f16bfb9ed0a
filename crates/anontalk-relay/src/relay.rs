//! Graph frame protocol for one WebSocket peer.
//!
//! Every connected peer gets a [`Connection`] that applies its frames to the
//! shared [`MemoryGraph`] and forwards subscription events back as
//! `event` frames. Merge stamps travel with each `put`, so the relay never
//! re-stamps client writes.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use anontalk_graph::wire::{ChildEntry, ClientFrame, RelayFrame};
use anontalk_graph::{GraphError, MemoryGraph, PeerEvent};
use anontalk_shared::now_millis;

use crate::api::AppState;

/// Per-peer protocol state: the graph plus one forwarding task per live
/// subscription.
pub struct Connection {
    peer_id: Uuid,
    graph: MemoryGraph,
    outbound: mpsc::UnboundedSender<RelayFrame>,
    forwarders: HashMap<u64, JoinHandle<()>>,
}

impl Connection {
    pub fn new(
        peer_id: Uuid,
        graph: MemoryGraph,
        outbound: mpsc::UnboundedSender<RelayFrame>,
    ) -> Self {
        Self {
            peer_id,
            graph,
            outbound,
            forwarders: HashMap::new(),
        }
    }

    /// Apply one client frame. Returns the direct reply, if the frame has
    /// one; subscription events go out through the outbound channel.
    pub fn handle(&mut self, frame: ClientFrame) -> Option<RelayFrame> {
        match frame {
            ClientFrame::Put { req, path, fields } => {
                let err = match self.graph.apply_stamped(&path, fields) {
                    Ok(_) => None,
                    Err(GraphError::Rejected(reason)) => {
                        debug!(peer = %self.peer_id, path = %path, %reason, "Put rejected");
                        Some(reason)
                    }
                    Err(e) => Some(e.to_string()),
                };
                Some(RelayFrame::Ack { req, err })
            }

            ClientFrame::Get { req, path } => Some(RelayFrame::Value {
                req,
                node: self.graph.snapshot(&path),
            }),

            ClientFrame::Children { req, path } => Some(RelayFrame::Entries {
                req,
                entries: self
                    .graph
                    .snapshot_children(&path)
                    .into_iter()
                    .map(|(key, node)| ChildEntry { key, node })
                    .collect(),
            }),

            ClientFrame::Subscribe { sub, path, scope } => {
                let mut subscription = self.graph.subscribe(&path, scope);
                let outbound = self.outbound.clone();
                let task = tokio::spawn(async move {
                    while let Some(event) = subscription.next().await {
                        let frame = RelayFrame::Event {
                            sub,
                            path: event.path,
                            key: event.key,
                            node: event.node,
                        };
                        if outbound.send(frame).is_err() {
                            break;
                        }
                    }
                });
                debug!(peer = %self.peer_id, sub, path = %path, ?scope, "Subscribed");
                if let Some(previous) = self.forwarders.insert(sub, task) {
                    previous.abort();
                }
                None
            }

            ClientFrame::Unsubscribe { sub } => {
                if let Some(task) = self.forwarders.remove(&sub) {
                    task.abort();
                    debug!(peer = %self.peer_id, sub, "Unsubscribed");
                }
                None
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.forwarders.len()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

/// Drive one upgraded WebSocket until either side goes away.
pub async fn handle_socket(socket: WebSocket, state: AppState, address: Option<SocketAddr>) {
    let peer_id = state.peers.lock().await.admit(address);
    info!(peer = %peer_id, addr = ?address, "Peer connected");
    state.graph.notify_peer(PeerEvent::Connected {
        peer_id: peer_id.to_string(),
    });

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    let mut connection = Connection::new(peer_id, state.graph.clone(), outbound.clone());

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(peer = %peer_id, error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match ClientFrame::from_json(&text) {
                    Ok(frame) => {
                        if let Some(reply) = connection.handle(frame) {
                            // Replies share the queue with events so a
                            // subscriber sees them in write order.
                            let _ = outbound.send(reply);
                        }
                    }
                    Err(e) => {
                        debug!(peer = %peer_id, error = %e, "Dropping malformed frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(peer = %peer_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
    }

    drop(connection);
    let connected_for_ms = state
        .peers
        .lock()
        .await
        .release(&peer_id)
        .map(|session| session.attached_for_ms(now_millis()))
        .unwrap_or_default();
    info!(peer = %peer_id, connected_for_ms, "Peer disconnected");
    state.graph.notify_peer(PeerEvent::Disconnected {
        peer_id: peer_id.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use anontalk_graph::{Scope, StateClock};
    use anontalk_shared::{GraphPath, Node};

    fn connection() -> (Connection, mpsc::UnboundedReceiver<RelayFrame>, MemoryGraph) {
        let graph = MemoryGraph::new();
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(Uuid::new_v4(), graph.clone(), tx), rx, graph)
    }

    fn put(req: u64, path: &GraphPath, node: Node) -> ClientFrame {
        ClientFrame::Put {
            req,
            path: path.clone(),
            fields: StateClock::new().stamp(node),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (mut conn, _rx, _) = connection();
        let path = GraphPath::parse("users/alice").unwrap();

        let ack = conn.handle(put(1, &path, Node::new().with("lastUpdated", 5u64)));
        assert_eq!(ack, Some(RelayFrame::Ack { req: 1, err: None }));

        match conn.handle(ClientFrame::Get { req: 2, path }) {
            Some(RelayFrame::Value { req: 2, node: Some(node) }) => {
                assert_eq!(node.get_u64("lastUpdated"), Some(5));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_account_overwrite_rejected() {
        let (mut conn, _rx, _) = connection();
        let path = GraphPath::parse("~@alice").unwrap();

        conn.handle(put(1, &path, Node::new().with("pub", "aa")));
        match conn.handle(put(2, &path, Node::new().with("pub", "bb"))) {
            Some(RelayFrame::Ack { req: 2, err: Some(_) }) => {}
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_forwards_and_unsubscribes() {
        let (mut conn, mut rx, graph) = connection();
        let root = GraphPath::root("presence");

        assert!(conn
            .handle(ClientFrame::Subscribe {
                sub: 7,
                path: root.clone(),
                scope: Scope::Children,
            })
            .is_none());

        graph
            .apply_stamped(
                &root.child("bob"),
                StateClock::new().stamp(Node::new().with("online", true)),
            )
            .unwrap();

        match rx.recv().await {
            Some(RelayFrame::Event { sub: 7, key, .. }) => assert_eq!(key, "bob"),
            other => panic!("unexpected frame: {other:?}"),
        }

        conn.handle(ClientFrame::Unsubscribe { sub: 7 });
        assert_eq!(conn.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_children_lists_entries() {
        let (mut conn, _rx, _) = connection();
        let root = GraphPath::root("channels");
        conn.handle(put(1, &root.child("general"), Node::new().with("name", "general")));
        conn.handle(put(2, &root.child("rust"), Node::new().with("name", "rust")));

        match conn.handle(ClientFrame::Children { req: 3, path: root }) {
            Some(RelayFrame::Entries { entries, .. }) => {
                let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
                assert_eq!(keys, vec!["general", "rust"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
