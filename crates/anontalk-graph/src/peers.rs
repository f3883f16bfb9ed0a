//! Bookkeeping for WebSocket peers attached to a relay.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::debug;
use uuid::Uuid;

use anontalk_shared::now_millis;

/// One attached peer. The id is minted on upgrade and means nothing
/// outside this relay process.
#[derive(Debug, Clone)]
pub struct PeerSession {
    pub peer_id: Uuid,
    pub address: Option<SocketAddr>,
    /// Unix epoch millis of the upgrade.
    pub attached_at: u64,
}

impl PeerSession {
    pub fn attached_for_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.attached_at)
    }
}

#[derive(Debug, Default)]
pub struct PeerTracker {
    sessions: HashMap<Uuid, PeerSession>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, address: Option<SocketAddr>) -> Uuid {
        let session = PeerSession {
            peer_id: Uuid::new_v4(),
            address,
            attached_at: now_millis(),
        };
        let peer_id = session.peer_id;
        self.sessions.insert(peer_id, session);
        debug!(peer = %peer_id, attached = self.sessions.len(), "Peer admitted");
        peer_id
    }

    /// Forget a peer. `None` if it was never admitted or already released.
    pub fn release(&mut self, peer_id: &Uuid) -> Option<PeerSession> {
        let session = self.sessions.remove(peer_id)?;
        debug!(peer = %peer_id, attached = self.sessions.len(), "Peer released");
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, peer_id: &Uuid) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }
}
