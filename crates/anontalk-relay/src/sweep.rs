//! Presence backstop: mark users offline whose client stopped heartbeating
//! without saying goodbye.
//!
//! The sweep only ever clears the `online` flag. `lastSeen` and `username`
//! stay as the owner wrote them.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use anontalk_graph::GraphClient;
use anontalk_shared::now_millis;
use anontalk_shared::records::{presence_root, MarkStale, PresenceRecord};

use crate::error::Result;

/// One pass over every presence record. Returns how many were marked
/// offline. A failed write is logged and the pass moves on to the next
/// record; only failing to list the records fails the pass.
pub async fn sweep_once<G: GraphClient>(graph: &G, now: u64, threshold: Duration) -> Result<usize> {
    let root = presence_root();
    let threshold_ms = threshold.as_millis() as u64;
    let mut marked = 0;

    for (user, node) in graph.once_children(&root).await? {
        let Ok(record) = PresenceRecord::from_node(&node) else {
            continue;
        };
        if !record.is_stale(now, threshold_ms) {
            continue;
        }

        if let Err(e) = graph.put(&root.child(&user), MarkStale.to_node()).await {
            warn!(user = %user, error = %e, "Could not mark presence offline");
            continue;
        }
        info!(
            user = %user,
            last_seen = record.last_seen,
            age_ms = now.saturating_sub(record.last_seen),
            "Marked stale presence offline"
        );
        marked += 1;
    }

    Ok(marked)
}

/// Run the sweep every `interval` until the process exits.
pub fn spawn_sweeper<G: GraphClient>(
    graph: G,
    interval: Duration,
    threshold: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match sweep_once(&graph, now_millis(), threshold).await {
                Ok(0) => {}
                Ok(marked) => debug!(marked, "Presence sweep finished"),
                Err(e) => warn!(error = %e, "Presence sweep failed"),
            }
        }
    })
}
