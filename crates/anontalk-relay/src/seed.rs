//! Startup seeding of the namespace roots and the default channel.

use tracing::info;

use anontalk_graph::GraphClient;
use anontalk_shared::constants::{ROOT_NAMESPACES, SYSTEM_CREATOR};
use anontalk_shared::records::{channel_path, ChannelDescriptor};
use anontalk_shared::{now_millis, ChannelName, GraphPath, Node};

use crate::error::Result;

/// Mark every root namespace as initialized and register the default
/// channel.
pub async fn seed<G: GraphClient>(graph: &G, default_channel: &ChannelName) -> Result<()> {
    for namespace in ROOT_NAMESPACES {
        graph.put(&GraphPath::root(namespace), Node::sentinel()).await?;
    }

    let descriptor = ChannelDescriptor {
        name: default_channel.clone(),
        created_by: SYSTEM_CREATOR.to_string(),
        timestamp: now_millis(),
    };
    graph
        .put(&channel_path(default_channel), descriptor.to_node())
        .await?;

    info!(channel = %default_channel, "Graph seeded");
    Ok(())
}
