//! Client entry point and the per-login session.
//!
//! [`ChatClient`] owns the graph connection and session storage and hands
//! out a [`Session`] on successful authentication. A `Session` owns the
//! presence, channel and message tasks; `logout` tears them down in order.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use anontalk_graph::{GraphClient, RemoteGraph};
use anontalk_shared::identity::Identity;
use anontalk_shared::{ChannelName, MessageId, Username};
use anontalk_store::{Database, SessionStore, SqliteSessionStore};

use crate::channels::ChannelRegistry;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{spawn_connection_monitor, ConnectionState};
use crate::identity::IdentityManager;
use crate::media::{MediaPipeline, MediaUploader, PinataUploader};
use crate::messages::{ChannelView, MessageStream};
use crate::presence::{OnlineUser, PresenceState, PresenceTracker};
use crate::profile::ProfileService;

/// Open the SQLite session store in the configured (or platform) data
/// directory.
pub fn open_session_store(config: &ClientConfig) -> Result<Arc<dyn SessionStore>> {
    let db = match config.data_dir {
        Some(ref dir) => Database::open_in_dir(dir)?,
        None => Database::new()?,
    };
    Ok(Arc::new(SqliteSessionStore::new(db)))
}

pub struct ChatClient<G: GraphClient, U: MediaUploader> {
    config: ClientConfig,
    graph: G,
    identity: IdentityManager<G>,
    media: Arc<MediaPipeline<U>>,
    connection: watch::Receiver<ConnectionState>,
}

impl ChatClient<RemoteGraph, PinataUploader> {
    /// Connect to the configured relay with on-disk session storage.
    ///
    /// An unreachable relay is reported as `ClientError::Unavailable`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let sessions = open_session_store(&config)?;
        let graph = RemoteGraph::connect(&config.relay_url)
            .await
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;
        let uploader = PinataUploader::from_config(&config);
        Ok(Self::with_graph(config, graph, uploader, sessions))
    }
}

impl<G: GraphClient, U: MediaUploader> ChatClient<G, U> {
    /// Build a client over an already connected graph.
    pub fn with_graph(
        config: ClientConfig,
        graph: G,
        uploader: U,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let connection = spawn_connection_monitor(graph.peer_events(), ConnectionState::Connected);
        Self {
            identity: IdentityManager::new(graph.clone(), sessions),
            media: Arc::new(MediaPipeline::new(uploader)),
            graph,
            config,
            connection,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<Session<G, U>> {
        let identity = self.identity.sign_up(username, password).await?;
        Ok(self.start_session(identity))
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<Session<G, U>> {
        let identity = self.identity.sign_in(username, password).await?;
        Ok(self.start_session(identity))
    }

    /// Resume the last session without a password, if one was saved.
    pub async fn restore_session(&self) -> Result<Option<Session<G, U>>> {
        let identity = self.identity.restore_session().await?;
        Ok(identity.map(|identity| self.start_session(identity)))
    }

    fn start_session(&self, identity: Identity) -> Session<G, U> {
        let username = identity.display_name().clone();
        info!(user = %username, "Session started");

        Session {
            presence: PresenceTracker::start(self.graph.clone(), username.clone(), &self.config),
            channels: ChannelRegistry::start(self.graph.clone()),
            messages: MessageStream::start(
                self.graph.clone(),
                self.media.clone(),
                ChannelName::default_channel(),
            ),
            profile: ProfileService::new(self.graph.clone(), self.media.clone(), username),
            manager: self.identity.clone(),
            identity,
        }
    }
}

/// An authenticated user with live presence, channels and messages.
pub struct Session<G: GraphClient, U: MediaUploader> {
    identity: Identity,
    manager: IdentityManager<G>,
    presence: PresenceTracker,
    channels: ChannelRegistry<G>,
    messages: MessageStream<G, U>,
    profile: ProfileService<G, U>,
}

impl<G: GraphClient, U: MediaUploader> Session<G, U> {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn username(&self) -> &Username {
        self.identity.display_name()
    }

    pub fn online_users(&self) -> watch::Receiver<Vec<OnlineUser>> {
        self.presence.online_users()
    }

    pub fn presence_state(&self) -> PresenceState {
        self.presence.state()
    }

    pub fn channels(&self) -> watch::Receiver<Vec<ChannelName>> {
        self.channels.channels()
    }

    pub fn messages(&self) -> watch::Receiver<ChannelView> {
        self.messages.view()
    }

    pub fn current_channel(&self) -> ChannelName {
        self.messages.current_channel()
    }

    pub fn profile(&self) -> &ProfileService<G, U> {
        &self.profile
    }

    pub async fn create_channel(&self, name: &str) -> Result<ChannelName> {
        self.channels.create_channel(name, self.username()).await
    }

    pub async fn switch_channel(&self, name: &str) -> Result<ChannelName> {
        self.messages.switch_channel(name).await
    }

    /// Send text to the channel currently in view.
    pub async fn send_text(&self, text: &str) -> Result<MessageId> {
        let channel = self.current_channel();
        self.messages
            .send_text(channel.as_str(), self.username(), text)
            .await
    }

    /// Send an image with an optional caption to the channel in view.
    pub async fn send_media(&self, caption: &str, bytes: Vec<u8>) -> Result<MessageId> {
        let channel = self.current_channel();
        self.messages
            .send_media(channel.as_str(), self.username(), caption, bytes)
            .await
    }

    pub async fn update_profile_picture(&self, url: &str) -> Result<()> {
        self.profile.update_profile_picture(url).await
    }

    /// Go offline, stop every subscription and forget the saved session.
    pub async fn logout(self) {
        let Self {
            identity,
            manager,
            presence,
            channels,
            messages,
            ..
        } = self;

        presence.stop().await;
        messages.stop().await;
        channels.stop().await;
        manager.forget_session();
        info!(user = %identity.display_name(), "Logged out");
    }

    /// Like `logout` but keeps the saved session, so the next start can
    /// restore it.
    pub async fn close(self) {
        let Self {
            identity,
            presence,
            channels,
            messages,
            ..
        } = self;

        presence.stop().await;
        messages.stop().await;
        channels.stop().await;
        info!(user = %identity.display_name(), "Session closed");
    }
}
