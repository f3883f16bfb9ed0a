//! Graph client backed by a relay over WebSocket.
//!
//! The socket is owned by a dedicated tokio task. Handles talk to it through
//! a command channel; replies are matched to requests by id and events are
//! routed to subscriptions by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use anontalk_shared::{GraphPath, Node};

use crate::client::{GraphClient, GraphEvent, PeerEvent, Scope, Subscription};
use crate::error::{GraphError, Result};
use crate::state::StateClock;
use crate::wire::{ClientFrame, RelayFrame};

/// How long a request waits for the relay before giving up.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const PEER_EVENT_CAPACITY: usize = 16;

/// Commands sent *into* the connection task.
enum Command {
    /// Send a frame and route the reply with the same `req` back.
    Request {
        req: u64,
        frame: ClientFrame,
        reply: oneshot::Sender<RelayFrame>,
    },
    Subscribe {
        sub: u64,
        path: GraphPath,
        scope: Scope,
        events: mpsc::UnboundedSender<GraphEvent>,
    },
    Unsubscribe {
        sub: u64,
    },
}

struct Inner {
    cmd_tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    clock: StateClock,
    peers: broadcast::Sender<PeerEvent>,
}

/// Handle on a relay connection. Clones share the connection.
#[derive(Clone)]
pub struct RemoteGraph {
    inner: Arc<Inner>,
    timeout: Duration,
}

impl RemoteGraph {
    /// Open a WebSocket to `url` (e.g. `ws://localhost:8765/gun`) and spawn
    /// the connection task.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| GraphError::Connect(e.to_string()))?;
        info!(url = %url, "Connected to relay");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (peers, _) = broadcast::channel(PEER_EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            cmd_tx,
            next_id: AtomicU64::new(1),
            clock: StateClock::new(),
            peers: peers.clone(),
        });

        let _ = peers.send(PeerEvent::Connected {
            peer_id: url.to_string(),
        });
        tokio::spawn(run_connection(ws_stream, cmd_rx, peers, url.to_string()));

        Ok(Self {
            inner,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `false` once the connection task has stopped.
    pub fn is_connected(&self) -> bool {
        !self.inner.cmd_tx.is_closed()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, req: u64, frame: ClientFrame) -> Result<RelayFrame> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .cmd_tx
            .send(Command::Request { req, frame, reply })
            .map_err(|_| GraphError::Disconnected)?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(GraphError::Disconnected),
            Err(_) => Err(GraphError::Timeout(self.timeout)),
        }
    }

    fn subscribe(&self, path: &GraphPath, scope: Scope) -> Subscription {
        let sub = self.next_id();
        let (events, rx) = mpsc::unbounded_channel();

        if self
            .inner
            .cmd_tx
            .send(Command::Subscribe {
                sub,
                path: path.clone(),
                scope,
                events,
            })
            .is_err()
        {
            debug!(path = %path, "Subscribe on closed connection");
        }

        let cmd_tx = self.inner.cmd_tx.clone();
        Subscription::new(rx, move || {
            let _ = cmd_tx.send(Command::Unsubscribe { sub });
        })
    }
}

impl GraphClient for RemoteGraph {
    async fn put(&self, path: &GraphPath, node: Node) -> Result<()> {
        let req = self.next_id();
        let fields = self.inner.clock.stamp(node);
        let frame = ClientFrame::Put {
            req,
            path: path.clone(),
            fields,
        };

        match self.request(req, frame).await? {
            RelayFrame::Ack { err: None, .. } => Ok(()),
            RelayFrame::Ack { err: Some(reason), .. } => Err(GraphError::Rejected(reason)),
            other => Err(unexpected(&other)),
        }
    }

    async fn once(&self, path: &GraphPath) -> Result<Option<Node>> {
        let req = self.next_id();
        let frame = ClientFrame::Get {
            req,
            path: path.clone(),
        };

        match self.request(req, frame).await? {
            RelayFrame::Value { node, .. } => Ok(node),
            other => Err(unexpected(&other)),
        }
    }

    async fn once_children(&self, path: &GraphPath) -> Result<Vec<(String, Node)>> {
        let req = self.next_id();
        let frame = ClientFrame::Children {
            req,
            path: path.clone(),
        };

        match self.request(req, frame).await? {
            RelayFrame::Entries { entries, .. } => Ok(entries
                .into_iter()
                .map(|entry| (entry.key, entry.node))
                .collect()),
            other => Err(unexpected(&other)),
        }
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

/// Replies still owed by the relay, keyed by request id.
///
/// A request that timed out has dropped its receiver; its entry is pruned on
/// the next insert so a relay that never answers cannot grow the map.
#[derive(Default)]
struct PendingRequests {
    waiting: HashMap<u64, oneshot::Sender<RelayFrame>>,
}

impl PendingRequests {
    fn insert(&mut self, req: u64, reply: oneshot::Sender<RelayFrame>) {
        self.waiting.retain(|_, waiter| !waiter.is_closed());
        self.waiting.insert(req, reply);
    }

    fn complete(&mut self, req: u64, frame: RelayFrame) {
        if let Some(reply) = self.waiting.remove(&req) {
            let _ = reply.send(frame);
        }
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }
}

fn unexpected(frame: &RelayFrame) -> GraphError {
    GraphError::Protocol(format!("unexpected reply {frame:?}"))
}

async fn run_connection<S>(
    ws_stream: S,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    peers: broadcast::Sender<PeerEvent>,
    url: String,
) where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = ws_stream.split();
    let mut pending = PendingRequests::default();
    let mut subscriptions: HashMap<u64, mpsc::UnboundedSender<GraphEvent>> = HashMap::new();

    loop {
        tokio::select! {
            // --- Commands from handles ---
            cmd = cmd_rx.recv() => {
                let frame = match cmd {
                    Some(Command::Request { req, frame, reply }) => {
                        pending.insert(req, reply);
                        frame
                    }
                    Some(Command::Subscribe { sub, path, scope, events }) => {
                        subscriptions.insert(sub, events);
                        ClientFrame::Subscribe { sub, path, scope }
                    }
                    Some(Command::Unsubscribe { sub }) => {
                        if subscriptions.remove(&sub).is_none() {
                            continue;
                        }
                        ClientFrame::Unsubscribe { sub }
                    }
                    None => {
                        debug!("All graph handles dropped, closing relay connection");
                        let _ = write.close().await;
                        break;
                    }
                };

                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %e, "Relay send failed");
                    break;
                }
            }

            // --- Frames from the relay ---
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match RelayFrame::from_json(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!(error = %e, "Dropping malformed relay frame");
                                continue;
                            }
                        };
                        match frame {
                            RelayFrame::Ack { req, .. }
                            | RelayFrame::Value { req, .. }
                            | RelayFrame::Entries { req, .. } => pending.complete(req, frame),
                            RelayFrame::Event { sub, path, key, node } => {
                                let delivered = subscriptions
                                    .get(&sub)
                                    .map(|tx| tx.send(GraphEvent { path, key, node }).is_ok());
                                if delivered == Some(false) {
                                    subscriptions.remove(&sub);
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(url = %url, "Relay closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "Relay connection error");
                        break;
                    }
                }
            }
        }
    }

    let _ = peers.send(PeerEvent::Disconnected { peer_id: url });
    debug!(unanswered = pending.len(), "Relay connection task terminated");
}
