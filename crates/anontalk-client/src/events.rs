//! Connection state derived from the graph's peer events.

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use anontalk_graph::PeerEvent;

/// Whether the graph store is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// The store could not be reached; carries the reason for display.
    Unavailable(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Fold peer events into a `ConnectionState` published on a watch channel.
/// The task ends when the graph's event sender goes away.
pub fn spawn_connection_monitor(
    mut events: broadcast::Receiver<PeerEvent>,
    initial: ConnectionState,
) -> watch::Receiver<ConnectionState> {
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PeerEvent::Connected { peer_id }) => {
                    info!(peer = %peer_id, "Graph peer connected");
                    tx.send_replace(ConnectionState::Connected);
                }
                Ok(PeerEvent::Disconnected { peer_id }) => {
                    warn!(peer = %peer_id, "Graph peer disconnected");
                    tx.send_replace(ConnectionState::Unavailable(format!(
                        "lost connection to {peer_id}"
                    )));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Connection monitor lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_marks_unavailable() {
        let (tx, rx) = broadcast::channel(4);
        let mut state = spawn_connection_monitor(rx, ConnectionState::Connected);
        assert!(state.borrow().is_connected());

        tx.send(PeerEvent::Disconnected {
            peer_id: "ws://localhost:8765/gun".into(),
        })
        .unwrap();
        state.changed().await.unwrap();
        assert!(!state.borrow().is_connected());

        tx.send(PeerEvent::Connected {
            peer_id: "ws://localhost:8765/gun".into(),
        })
        .unwrap();
        state.changed().await.unwrap();
        assert!(state.borrow().is_connected());
    }
}
