//! Append-only channel registry under `channels/`.

use std::collections::HashSet;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use anontalk_graph::{GraphClient, Subscription};
use anontalk_shared::records::{channel_path, channels_root, ChannelDescriptor};
use anontalk_shared::{now_millis, ChannelName, Node, Username};

use crate::error::{ClientError, Result, WriteError};

/// Known channel names in first-seen order. Always contains the default
/// channel.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    names: Vec<ChannelName>,
    seen: HashSet<ChannelName>,
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSet {
    pub fn new() -> Self {
        let general = ChannelName::default_channel();
        Self {
            names: vec![general.clone()],
            seen: HashSet::from([general]),
        }
    }

    /// Fold one registry event. Returns `true` when a new name appeared.
    pub fn apply(&mut self, node: Option<&Node>) -> bool {
        let Some(descriptor) = node.and_then(|n| ChannelDescriptor::from_node(n).ok()) else {
            return false;
        };
        if !self.seen.insert(descriptor.name.clone()) {
            return false;
        }
        self.names.push(descriptor.name);
        true
    }

    pub fn contains(&self, name: &ChannelName) -> bool {
        self.seen.contains(name)
    }

    pub fn names(&self) -> &[ChannelName] {
        &self.names
    }
}

/// Follows the registry and creates channels.
pub struct ChannelRegistry<G: GraphClient> {
    graph: G,
    channels: watch::Receiver<Vec<ChannelName>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<G: GraphClient> ChannelRegistry<G> {
    pub fn start(graph: G) -> Self {
        let (tx, channels) = watch::channel(ChannelSet::new().names().to_vec());
        let (stop_tx, stop_rx) = oneshot::channel();
        let sub = graph.map_on(&channels_root());
        let task = tokio::spawn(run_registry(sub, tx, stop_rx));
        Self {
            graph,
            channels,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn channels(&self) -> watch::Receiver<Vec<ChannelName>> {
        self.channels.clone()
    }

    pub fn known(&self) -> Vec<ChannelName> {
        self.channels.borrow().clone()
    }

    /// Register a channel under its normalized name.
    ///
    /// Creating a channel that already exists leaves the existing descriptor
    /// untouched and still returns its name.
    pub async fn create_channel(&self, raw: &str, creator: &Username) -> Result<ChannelName> {
        let name = ChannelName::normalize(raw)
            .ok_or_else(|| ClientError::InvalidInput(format!("invalid channel name {raw:?}")))?;
        let path = channel_path(&name);

        let existing = self.graph.once(&path).await.map_err(WriteError::from)?;
        if existing
            .as_ref()
            .is_some_and(|node| ChannelDescriptor::from_node(node).is_ok())
        {
            debug!(channel = %name, "Channel already registered");
            return Ok(name);
        }

        let descriptor = ChannelDescriptor {
            name: name.clone(),
            created_by: creator.as_str().to_string(),
            timestamp: now_millis(),
        };
        self.graph
            .put(&path, descriptor.to_node())
            .await
            .map_err(WriteError::from)?;

        info!(channel = %name, creator = %creator, "Channel created");
        Ok(name)
    }

    /// Detach from the registry and wait for the task to finish.
    pub async fn stop(mut self) {
        self.stop_tx.take();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Channel registry task failed");
            }
        }
    }
}

impl<G: GraphClient> Drop for ChannelRegistry<G> {
    fn drop(&mut self) {
        self.stop_tx.take();
    }
}

async fn run_registry(
    mut sub: Subscription,
    tx: watch::Sender<Vec<ChannelName>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut set = ChannelSet::new();

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            event = sub.next() => {
                let Some(event) = event else {
                    warn!("Channel registry subscription closed");
                    break;
                };
                if set.apply(event.node.as_ref()) {
                    debug!(key = %event.key, "Channel discovered");
                    tx.send_replace(set.names().to_vec());
                }
            }
        }
    }

    sub.detach();
}

#[cfg(test)]
mod tests {
    use super::*;
    use anontalk_graph::MemoryGraph;

    fn descriptor(name: &str) -> Node {
        Node::new()
            .with("name", name)
            .with("createdBy", "bob")
            .with("timestamp", 1u64)
    }

    #[test]
    fn test_set_starts_with_general_and_dedups() {
        let mut set = ChannelSet::new();
        assert_eq!(set.names()[0].as_str(), "general");

        assert!(!set.apply(Some(&descriptor("general"))));
        assert!(set.apply(Some(&descriptor("Random"))));
        assert!(!set.apply(Some(&descriptor("random "))));
        assert!(!set.apply(Some(&Node::sentinel())));
        assert!(!set.apply(None));

        let names: Vec<&str> = set.names().iter().map(ChannelName::as_str).collect();
        assert_eq!(names, vec!["general", "random"]);
    }

    #[tokio::test]
    async fn test_create_channel_normalizes() {
        let graph = MemoryGraph::new();
        let registry = ChannelRegistry::start(graph.clone());
        let bob = Username::parse("bob").unwrap();

        let name = registry.create_channel("  Rust ", &bob).await.unwrap();
        assert_eq!(name.as_str(), "rust");

        let mut channels = registry.channels();
        channels
            .wait_for(|names| names.iter().any(|n| n.as_str() == "rust"))
            .await
            .unwrap();

        let stored = graph.snapshot(&channel_path(&name)).unwrap();
        assert_eq!(stored.get_str("name"), Some("rust"));
        assert_eq!(stored.get_str("createdBy"), Some("bob"));
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_channels_written_after_start_keep_write_order() {
        let graph = MemoryGraph::new();
        let registry = ChannelRegistry::start(graph.clone());

        graph
            .put(&channel_path(&ChannelName::normalize("zeta").unwrap()), descriptor("zeta"))
            .await
            .unwrap();
        graph
            .put(&channel_path(&ChannelName::normalize("alpha").unwrap()), descriptor("alpha"))
            .await
            .unwrap();

        let mut channels = registry.channels();
        let names = channels
            .wait_for(|names| names.len() == 3)
            .await
            .unwrap()
            .clone();
        let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["general", "zeta", "alpha"]);
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_create_channel_rejects_empty() {
        let graph = MemoryGraph::new();
        let registry = ChannelRegistry::start(graph.clone());
        let bob = Username::parse("bob").unwrap();

        assert!(matches!(
            registry.create_channel("   ", &bob).await,
            Err(ClientError::InvalidInput(_))
        ));
        assert!(graph.snapshot_children(&channels_root()).is_empty());
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_recreating_keeps_first_descriptor() {
        let graph = MemoryGraph::new();
        let registry = ChannelRegistry::start(graph.clone());
        let bob = Username::parse("bob").unwrap();
        let carol = Username::parse("carol").unwrap();

        registry.create_channel("General", &bob).await.unwrap();
        registry.create_channel("general", &carol).await.unwrap();

        let children = graph.snapshot_children(&channels_root());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].1.get_str("createdBy"), Some("bob"));
        registry.stop().await;
    }

    #[tokio::test]
    async fn test_stop_detaches() {
        let graph = MemoryGraph::new();
        let registry = ChannelRegistry::start(graph.clone());
        // Let the task attach.
        tokio::task::yield_now().await;
        registry.stop().await;
        assert_eq!(graph.subscriber_count(), 0);
    }
}
