//! Per-channel message timelines and sending.
//!
//! One task follows the current channel's `messages/<channel>` children and
//! folds them into a [`ChannelTimeline`]. Switching channel detaches the old
//! subscription and clears the timeline before the new one attaches, so
//! nothing from the previous channel can leak into the new view.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use anontalk_graph::{GraphClient, GraphEvent, Subscription};
use anontalk_shared::records::{channel_messages_path, message_path, Message, MessageKind};
use anontalk_shared::{now_millis, ChannelName, GraphPath, MessageId, Node, Username};

use crate::error::{ClientError, Result, WriteError};
use crate::media::{MediaPipeline, MediaUploader};

/// Messages of one channel in arrival order, deduplicated by id.
#[derive(Debug, Clone)]
pub struct ChannelTimeline {
    channel: ChannelName,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl ChannelTimeline {
    pub fn new(channel: ChannelName) -> Self {
        Self {
            channel,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Fold one event. Invalid records and ids already present are ignored;
    /// returns `true` when a message was appended.
    pub fn apply(&mut self, key: &str, node: Option<&Node>) -> bool {
        let Some(node) = node else {
            return false;
        };
        let message = match Message::from_node(key, &self.channel, node) {
            Ok(message) => message,
            Err(e) => {
                debug!(channel = %self.channel, key, error = %e, "Dropped invalid message");
                return false;
            }
        };
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Copy of the timeline ordered by sender timestamp, ties by id.
    pub fn sorted_by_timestamp(&self) -> Vec<Message> {
        let mut sorted = self.messages.clone();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        sorted
    }

    pub fn view(&self) -> ChannelView {
        ChannelView {
            channel: self.channel.clone(),
            messages: self.messages.clone(),
        }
    }
}

/// What the UI renders for the current channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelView {
    pub channel: ChannelName,
    pub messages: Vec<Message>,
}

enum StreamCommand {
    Switch {
        channel: ChannelName,
        done: oneshot::Sender<()>,
    },
}

/// Live view of one channel plus the send operations.
pub struct MessageStream<G: GraphClient, U: MediaUploader> {
    graph: G,
    media: Arc<MediaPipeline<U>>,
    commands: mpsc::Sender<StreamCommand>,
    view: watch::Receiver<ChannelView>,
    task: JoinHandle<()>,
}

impl<G: GraphClient, U: MediaUploader> MessageStream<G, U> {
    /// Start following `channel`.
    pub fn start(graph: G, media: Arc<MediaPipeline<U>>, channel: ChannelName) -> Self {
        let (view_tx, view) = watch::channel(ChannelTimeline::new(channel.clone()).view());
        let (commands, commands_rx) = mpsc::channel(8);
        // Attached here, not in the task, so writes made right after
        // `start` returns are delivered live.
        let sub = graph.map_on(&channel_messages_path(&channel));
        let task = tokio::spawn(run_stream(
            graph.clone(),
            channel,
            sub,
            view_tx,
            commands_rx,
        ));
        Self {
            graph,
            media,
            commands,
            view,
            task,
        }
    }

    pub fn view(&self) -> watch::Receiver<ChannelView> {
        self.view.clone()
    }

    pub fn current_channel(&self) -> ChannelName {
        self.view.borrow().channel.clone()
    }

    /// Follow a different channel. When this returns the old subscription
    /// is detached and the published view is the new, empty channel.
    pub async fn switch_channel(&self, raw: &str) -> Result<ChannelName> {
        let channel = normalize_channel(raw)?;
        let (done, acked) = oneshot::channel();
        self.commands
            .send(StreamCommand::Switch {
                channel: channel.clone(),
                done,
            })
            .await
            .map_err(|_| ClientError::Unavailable("message stream stopped".into()))?;
        acked
            .await
            .map_err(|_| ClientError::Unavailable("message stream stopped".into()))?;
        Ok(channel)
    }

    /// Write a text message. Does not touch the local view; the message
    /// shows up through the subscription like anyone else's.
    pub async fn send_text(
        &self,
        channel: &str,
        sender: &Username,
        text: &str,
    ) -> Result<MessageId> {
        let channel = normalize_channel(channel)?;
        if text.trim().is_empty() {
            return Err(ClientError::InvalidInput("message is empty".into()));
        }
        self.write(
            &channel,
            sender,
            MessageKind::Text,
            Some(text.to_string()),
            None,
        )
        .await
    }

    /// Prepare and upload an image, then write a media message pointing at
    /// it. Nothing is written if the upload fails.
    pub async fn send_media(
        &self,
        channel: &str,
        sender: &Username,
        caption: &str,
        bytes: Vec<u8>,
    ) -> Result<MessageId> {
        let channel = normalize_channel(channel)?;
        let url = self.media.publish(bytes).await?;
        self.write(
            &channel,
            sender,
            MessageKind::Media,
            Some(caption.trim().to_string()),
            Some(url),
        )
        .await
    }

    async fn write(
        &self,
        channel: &ChannelName,
        sender: &Username,
        kind: MessageKind,
        text: Option<String>,
        content: Option<String>,
    ) -> Result<MessageId> {
        let timestamp = now_millis();
        let id = MessageId::generate(timestamp);
        let message = Message {
            id: id.clone(),
            kind,
            text,
            content,
            sender: sender.as_str().to_string(),
            timestamp,
            channel: channel.as_str().to_string(),
        };
        self.graph
            .put(&message_path(channel, &id), message.to_node())
            .await
            .map_err(WriteError::from)?;
        info!(channel = %channel, id = %id, kind = kind.as_str(), "Message sent");
        Ok(id)
    }

    /// Detach the current subscription and wait for the task to finish.
    pub async fn stop(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "Message stream task failed");
        }
    }
}

fn normalize_channel(raw: &str) -> Result<ChannelName> {
    ChannelName::normalize(raw)
        .ok_or_else(|| ClientError::InvalidInput(format!("invalid channel name {raw:?}")))
}

async fn next_event(sub: &mut Option<Subscription>) -> Option<GraphEvent> {
    match sub {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

async fn run_stream<G: GraphClient>(
    graph: G,
    channel: ChannelName,
    sub: Subscription,
    view_tx: watch::Sender<ChannelView>,
    mut commands: mpsc::Receiver<StreamCommand>,
) {
    let mut path: GraphPath = channel_messages_path(&channel);
    let mut timeline = ChannelTimeline::new(channel);
    let mut sub = Some(sub);
    debug!(channel = %timeline.channel(), "Following channel");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(StreamCommand::Switch { channel, done }) = command else {
                    break;
                };
                if let Some(old) = sub.take() {
                    old.detach();
                }
                timeline = ChannelTimeline::new(channel);
                view_tx.send_replace(timeline.view());

                path = channel_messages_path(timeline.channel());
                sub = Some(graph.map_on(&path));
                debug!(channel = %timeline.channel(), "Switched channel");
                let _ = done.send(());
            }

            event = next_event(&mut sub) => {
                let Some(event) = event else {
                    warn!(channel = %timeline.channel(), "Message subscription closed");
                    sub = None;
                    continue;
                };
                // Late delivery for a channel we already left.
                if !event.path.is_child_of(&path) {
                    continue;
                }
                if timeline.apply(&event.key, event.node.as_ref()) {
                    view_tx.send_replace(timeline.view());
                }
            }
        }
    }

    if let Some(sub) = sub {
        sub.detach();
    }
}
