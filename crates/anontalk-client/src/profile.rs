//! Profile pictures under `users/<username>`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use anontalk_graph::GraphClient;
use anontalk_shared::records::{default_avatar, picture_or_default, profile_path, Profile};
use anontalk_shared::{now_millis, Username};

use crate::error::{ClientError, Result, WriteError};
use crate::media::{MediaPipeline, MediaUploader};

/// One-shot picture lookup. Missing profiles and read failures both give
/// the default avatar.
pub async fn lookup_picture<G: GraphClient>(graph: &G, username: &str) -> String {
    match graph.once(&profile_path(username)).await {
        Ok(node) => picture_or_default(username, node.as_ref()),
        Err(e) => {
            debug!(user = %username, error = %e, "Profile lookup failed");
            default_avatar(username)
        }
    }
}

pub struct ProfileService<G: GraphClient, U: MediaUploader> {
    graph: G,
    media: Arc<MediaPipeline<U>>,
    username: Username,
}

impl<G: GraphClient, U: MediaUploader> ProfileService<G, U> {
    pub fn new(graph: G, media: Arc<MediaPipeline<U>>, username: Username) -> Self {
        Self {
            graph,
            media,
            username,
        }
    }

    /// Point our profile at `url`.
    pub async fn update_profile_picture(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ClientError::InvalidInput("picture URL is empty".into()));
        }
        let profile = Profile {
            profile_picture: Some(url.to_string()),
            last_updated: now_millis(),
        };
        self.graph
            .put(&profile_path(self.username.as_str()), profile.to_node())
            .await
            .map_err(WriteError::from)?;
        info!(user = %self.username, "Profile picture updated");
        Ok(())
    }

    /// Prepare and pin an avatar image. The profile is not changed.
    pub async fn upload_avatar(&self, bytes: Vec<u8>) -> Result<String> {
        self.media.publish(bytes).await
    }

    pub async fn profile_picture(&self, username: &str) -> String {
        lookup_picture(&self.graph, username).await
    }

    /// Follow a user's picture until the returned handle is dropped.
    pub fn watch(&self, username: &str) -> ProfileWatch {
        let username = username.to_string();
        let (tx, picture) = watch::channel(default_avatar(&username));
        let mut sub = self.graph.on(&profile_path(&username));

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = sub.next() => {
                        let Some(event) = event else { break };
                        let url = picture_or_default(&username, event.node.as_ref());
                        tx.send_if_modified(|current| {
                            if *current == url {
                                return false;
                            }
                            *current = url;
                            true
                        });
                    }
                }
            }
            sub.detach();
        });

        ProfileWatch {
            picture,
            task: Some(task),
        }
    }
}

/// Live picture of one user. Dropping it detaches.
pub struct ProfileWatch {
    picture: watch::Receiver<String>,
    task: Option<JoinHandle<()>>,
}

impl ProfileWatch {
    pub fn current(&self) -> String {
        self.picture.borrow().clone()
    }

    pub fn changes(&self) -> watch::Receiver<String> {
        self.picture.clone()
    }

    /// Stop following and wait until the subscription is gone.
    pub async fn detach(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ProfileWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PinataUploader;
    use crate::ClientConfig;
    use anontalk_graph::MemoryGraph;

    fn service(graph: &MemoryGraph) -> ProfileService<MemoryGraph, PinataUploader> {
        let media = Arc::new(MediaPipeline::new(PinataUploader::from_config(
            &ClientConfig::default(),
        )));
        ProfileService::new(graph.clone(), media, Username::parse("alice").unwrap())
    }

    #[tokio::test]
    async fn test_default_avatar_when_missing() {
        let graph = MemoryGraph::new();
        let profile = service(&graph);
        assert_eq!(
            profile.profile_picture("nobody").await,
            "https://api.dicebear.com/9.x/thumbs/svg?seed=nobody"
        );
    }

    #[tokio::test]
    async fn test_update_then_read() {
        let graph = MemoryGraph::new();
        let profile = service(&graph);

        profile
            .update_profile_picture("https://gateway.pinata.cloud/ipfs/Qm1")
            .await
            .unwrap();
        assert_eq!(
            profile.profile_picture("alice").await,
            "https://gateway.pinata.cloud/ipfs/Qm1"
        );
        let node = graph.snapshot(&profile_path("alice")).unwrap();
        assert!(node.get_u64("lastUpdated").is_some());
    }

    #[tokio::test]
    async fn test_blank_url_rejected() {
        let graph = MemoryGraph::new();
        let profile = service(&graph);
        assert!(matches!(
            profile.update_profile_picture("  ").await,
            Err(ClientError::InvalidInput(_))
        ));
        assert!(graph.snapshot(&profile_path("alice")).is_none());
    }

    #[tokio::test]
    async fn test_upload_rejects_undecodable_avatar() {
        let graph = MemoryGraph::new();
        let profile = service(&graph);
        assert!(matches!(
            profile.upload_avatar(vec![0u8; 16]).await,
            Err(ClientError::Media(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_follows_updates() {
        let graph = MemoryGraph::new();
        let profile = service(&graph);
        let watch = profile.watch("alice");
        let mut changes = watch.changes();

        profile
            .update_profile_picture("https://x/alice.png")
            .await
            .unwrap();
        changes
            .wait_for(|url| url == "https://x/alice.png")
            .await
            .unwrap();
        assert_eq!(watch.current(), "https://x/alice.png");

        watch.detach().await;
        assert_eq!(graph.subscriber_count(), 0);
    }
}
