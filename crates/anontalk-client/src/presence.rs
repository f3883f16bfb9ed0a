//! Presence: our own heartbeat plus the live set of everyone else's.
//!
//! One task per session owns the heartbeat timer and the subscription to the
//! `presence` namespace and folds events into a [`PresenceView`]. A peer is
//! live only while its record says `online` and its last heartbeat is
//! younger than the staleness window.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use anontalk_graph::{GraphClient, Subscription};
use anontalk_shared::records::{default_avatar, presence_path, presence_root, PresenceRecord};
use anontalk_shared::{now_millis, GraphPath, Node, Username};

use crate::config::ClientConfig;
use crate::profile::lookup_picture;

/// Lifecycle of the local user's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Offline,
    /// A heartbeat write is in flight (or the last one failed).
    Announcing,
    Online,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineUser {
    pub username: String,
    pub profile_picture: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(String),
    Left(String),
    Refreshed,
    Ignored,
}

#[derive(Debug, Clone)]
struct LivePeer {
    last_seen: u64,
    profile_picture: Option<String>,
}

/// Local fold of presence records into the set of live users.
#[derive(Debug, Clone)]
pub struct PresenceView {
    window_ms: u64,
    peers: BTreeMap<String, LivePeer>,
}

impl PresenceView {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            peers: BTreeMap::new(),
        }
    }

    /// Fold one presence event. Anything that does not decode to a live
    /// record (sentinel, malformed, offline, stale) removes the peer.
    pub fn apply(&mut self, key: &str, node: Option<&Node>, now: u64) -> PresenceChange {
        let live = node
            .and_then(|n| PresenceRecord::from_node(n).ok())
            .filter(|record| record.is_live(now, self.window_ms));

        match live {
            Some(record) => match self.peers.get_mut(key) {
                Some(peer) => {
                    peer.last_seen = peer.last_seen.max(record.last_seen);
                    PresenceChange::Refreshed
                }
                None => {
                    self.peers.insert(
                        key.to_string(),
                        LivePeer {
                            last_seen: record.last_seen,
                            profile_picture: None,
                        },
                    );
                    PresenceChange::Joined(key.to_string())
                }
            },
            None => match self.peers.remove(key) {
                Some(_) => PresenceChange::Left(key.to_string()),
                None => PresenceChange::Ignored,
            },
        }
    }

    /// Drop every peer whose last heartbeat has aged past the window.
    pub fn evict_stale(&mut self, now: u64) -> Vec<String> {
        let window = self.window_ms;
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.saturating_sub(peer.last_seen) >= window)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            self.peers.remove(name);
        }
        stale
    }

    pub fn set_picture(&mut self, username: &str, url: String) {
        if let Some(peer) = self.peers.get_mut(username) {
            peer.profile_picture = Some(url);
        }
    }

    pub fn is_live(&self, username: &str) -> bool {
        self.peers.contains_key(username)
    }

    /// Live users sorted by name, with the default avatar filled in for
    /// anyone whose picture has not been looked up yet.
    pub fn users(&self) -> Vec<OnlineUser> {
        self.peers
            .iter()
            .map(|(name, peer)| OnlineUser {
                username: name.clone(),
                profile_picture: peer
                    .profile_picture
                    .clone()
                    .unwrap_or_else(|| default_avatar(name)),
            })
            .collect()
    }
}

/// Handle on the running presence task.
pub struct PresenceTracker {
    users: watch::Receiver<Vec<OnlineUser>>,
    state: watch::Receiver<PresenceState>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PresenceTracker {
    /// Announce `username` and start following everyone's presence.
    pub fn start<G: GraphClient>(graph: G, username: Username, config: &ClientConfig) -> Self {
        let (users_tx, users) = watch::channel(Vec::new());
        let (state_tx, state) = watch::channel(PresenceState::Offline);
        let (stop_tx, stop_rx) = oneshot::channel();
        // Attached before returning so no write made after `start` is missed.
        let sub = graph.map_on(&presence_root());

        let heartbeat = Heartbeat {
            path: presence_path(&username),
            graph,
            username,
            last_seen: 0,
        };

        let task = tokio::spawn(run_presence(
            sub,
            heartbeat,
            config.heartbeat_period,
            config.staleness_window,
            users_tx,
            state_tx,
            stop_rx,
        ));

        Self {
            users,
            state,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn online_users(&self) -> watch::Receiver<Vec<OnlineUser>> {
        self.users.clone()
    }

    pub fn state(&self) -> PresenceState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PresenceState> {
        self.state.clone()
    }

    /// Stop the heartbeat, write a final offline record, then detach, and
    /// wait for all three to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Presence task failed");
            }
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        // The task tears itself down in order once the stop sender is gone.
        self.stop_tx.take();
    }
}

struct Heartbeat<G: GraphClient> {
    graph: G,
    path: GraphPath,
    username: Username,
    last_seen: u64,
}

impl<G: GraphClient> Heartbeat<G> {
    /// Next `lastSeen`, never behind the previous one.
    fn stamp(&mut self) -> u64 {
        self.last_seen = self.last_seen.max(now_millis());
        self.last_seen
    }

    async fn announce(&mut self, state: &watch::Sender<PresenceState>) {
        state.send_replace(PresenceState::Announcing);
        let last_seen = self.stamp();
        let record = PresenceRecord::heartbeat(&self.username, last_seen);
        match self.graph.put(&self.path, record.to_node()).await {
            Ok(()) => {
                state.send_replace(PresenceState::Online);
            }
            Err(e) => warn!(user = %self.username, error = %e, "Heartbeat write failed"),
        }
    }

    async fn go_offline(&mut self) {
        let record = PresenceRecord::offline(self.stamp());
        if let Err(e) = self.graph.put(&self.path, record.to_node()).await {
            debug!(user = %self.username, error = %e, "Offline presence write failed");
        }
    }
}

async fn run_presence<G: GraphClient>(
    mut sub: Subscription,
    mut heartbeat: Heartbeat<G>,
    period: Duration,
    window: Duration,
    users_tx: watch::Sender<Vec<OnlineUser>>,
    state_tx: watch::Sender<PresenceState>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let graph = heartbeat.graph.clone();
    let username = heartbeat.username.clone();
    let mut view = PresenceView::new(window);

    heartbeat.announce(&state_tx).await;
    info!(user = %username, period = ?period, "Presence started");

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut subscribed = true;
    // Profile reads run beside the loop so a slow store never delays a
    // heartbeat.
    let mut lookups: JoinSet<(String, String)> = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,

            _ = ticker.tick() => {
                heartbeat.announce(&state_tx).await;
                let gone = view.evict_stale(now_millis());
                if !gone.is_empty() {
                    debug!(users = ?gone, "Evicted stale peers");
                    users_tx.send_replace(view.users());
                }
            }

            event = sub.next(), if subscribed => {
                let Some(event) = event else {
                    warn!("Presence subscription closed");
                    subscribed = false;
                    continue;
                };
                match view.apply(&event.key, event.node.as_ref(), now_millis()) {
                    PresenceChange::Joined(user) => {
                        debug!(user = %user, "Peer online");
                        users_tx.send_replace(view.users());
                        let graph = graph.clone();
                        lookups.spawn(async move {
                            let picture = lookup_picture(&graph, &user).await;
                            (user, picture)
                        });
                    }
                    PresenceChange::Left(user) => {
                        debug!(user = %user, "Peer offline");
                        users_tx.send_replace(view.users());
                    }
                    PresenceChange::Refreshed | PresenceChange::Ignored => {}
                }
            }

            Some(done) = lookups.join_next(), if !lookups.is_empty() => match done {
                Ok((user, picture)) if view.is_live(&user) => {
                    view.set_picture(&user, picture);
                    users_tx.send_replace(view.users());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Profile lookup task failed"),
            },
        }
    }

    lookups.abort_all();
    drop(ticker);
    heartbeat.go_offline().await;
    sub.detach();

    state_tx.send_replace(PresenceState::Offline);
    users_tx.send_replace(Vec::new());
    info!(user = %username, "Presence stopped");
}
