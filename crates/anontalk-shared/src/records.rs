//! Typed records stored in the graph and their node encodings.
//!
//! Field names match what every client writes, so records from peers running
//! other builds decode the same way.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_AVATAR_BASE, NS_CHANNELS, NS_MESSAGES, NS_PRESENCE, NS_USERS};
use crate::error::DecodeError;
use crate::node::{GraphPath, Node};
use crate::types::{ChannelName, MessageId, Username};

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

pub fn presence_root() -> GraphPath {
    GraphPath::root(NS_PRESENCE)
}

pub fn presence_path(username: &Username) -> GraphPath {
    presence_root().child(username.as_str())
}

pub fn profile_path(username: &str) -> GraphPath {
    GraphPath::root(NS_USERS).child(username)
}

pub fn channels_root() -> GraphPath {
    GraphPath::root(NS_CHANNELS)
}

pub fn channel_path(name: &ChannelName) -> GraphPath {
    channels_root().child(name.as_str())
}

pub fn channel_messages_path(channel: &ChannelName) -> GraphPath {
    GraphPath::root(NS_MESSAGES).child(channel.as_str())
}

pub fn message_path(channel: &ChannelName, id: &MessageId) -> GraphPath {
    channel_messages_path(channel).child(id.as_str())
}

/// `~@<username>`: the alias claim pointing at an account public key.
pub fn alias_path(username: &Username) -> GraphPath {
    GraphPath::root(&format!("~@{}", username.as_str()))
}

/// `~<pub>`: the account node holding the sealed keypair.
pub fn account_path(public_key_hex: &str) -> GraphPath {
    GraphPath::root(&format!("~{public_key_hex}"))
}

// ---------------------------------------------------------------------------
// Field ownership
// ---------------------------------------------------------------------------

/// Who is performing a write to a shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    /// The user the record describes.
    Owner,
    /// The relay's staleness sweeper.
    Sweeper,
}

/// One row of a record's ownership table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub owner: bool,
    pub sweeper: bool,
}

/// Presence is the one record with two writers. The sweeper may only touch
/// `online`, and only to clear it.
pub const PRESENCE_FIELDS: &[FieldRule] = &[
    FieldRule { field: "online", owner: true, sweeper: true },
    FieldRule { field: "lastSeen", owner: true, sweeper: false },
    FieldRule { field: "username", owner: true, sweeper: false },
];

pub fn permits(table: &[FieldRule], writer: Writer, field: &str) -> bool {
    table.iter().any(|rule| {
        rule.field == field
            && match writer {
                Writer::Owner => rule.owner,
                Writer::Sweeper => rule.sweeper,
            }
    })
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub online: bool,
    /// Unix epoch millis of the owner's last heartbeat.
    pub last_seen: u64,
    /// Absent on offline writes.
    pub username: Option<String>,
}

impl PresenceRecord {
    pub fn heartbeat(username: &Username, now: u64) -> Self {
        Self {
            online: true,
            last_seen: now,
            username: Some(username.as_str().to_string()),
        }
    }

    pub fn offline(now: u64) -> Self {
        Self {
            online: false,
            last_seen: now,
            username: None,
        }
    }

    /// Owner write.
    pub fn to_node(&self) -> Node {
        let mut node = Node::new()
            .with("online", self.online)
            .with("lastSeen", self.last_seen);
        if let Some(ref username) = self.username {
            node.insert("username", username.as_str());
        }
        node
    }

    /// Missing fields read as "offline, never seen".
    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        if node.is_sentinel() {
            return Err(DecodeError::Sentinel);
        }
        Ok(Self {
            online: node.get_bool("online").unwrap_or(false),
            last_seen: node.get_u64("lastSeen").unwrap_or(0),
            username: node.get_str("username").map(str::to_string),
        })
    }

    /// Live iff flagged online and the last heartbeat is younger than the
    /// window. A future `last_seen` (skewed clock) counts as fresh.
    pub fn is_live(&self, now: u64, window_ms: u64) -> bool {
        self.online && now.saturating_sub(self.last_seen) < window_ms
    }

    /// Whether the sweeper should mark this record offline.
    pub fn is_stale(&self, now: u64, threshold_ms: u64) -> bool {
        self.online && now.saturating_sub(self.last_seen) > threshold_ms
    }
}

/// The sweeper's only write: clear `online` without touching owner fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkStale;

impl MarkStale {
    pub fn to_node(self) -> Node {
        let node = Node::new().with("online", false);
        debug_assert!(node
            .fields()
            .all(|(field, _)| permits(PRESENCE_FIELDS, Writer::Sweeper, field)));
        node
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_picture: Option<String>,
    pub last_updated: u64,
}

impl Profile {
    pub fn to_node(&self) -> Node {
        let mut node = Node::new().with("lastUpdated", self.last_updated);
        if let Some(ref picture) = self.profile_picture {
            node.insert("profilePicture", picture.as_str());
        }
        node
    }

    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        if node.is_sentinel() {
            return Err(DecodeError::Sentinel);
        }
        Ok(Self {
            profile_picture: node.get_str("profilePicture").map(str::to_string),
            last_updated: node.get_u64("lastUpdated").unwrap_or(0),
        })
    }
}

/// Deterministic avatar for users without a profile picture.
pub fn default_avatar(username: &str) -> String {
    format!("{DEFAULT_AVATAR_BASE}{username}")
}

/// Picture from an optional profile node, falling back to the default avatar.
pub fn picture_or_default(username: &str, node: Option<&Node>) -> String {
    node.and_then(|n| Profile::from_node(n).ok())
        .and_then(|p| p.profile_picture)
        .unwrap_or_else(|| default_avatar(username))
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: ChannelName,
    pub created_by: String,
    pub timestamp: u64,
}

impl ChannelDescriptor {
    pub fn to_node(&self) -> Node {
        Node::new()
            .with("name", self.name.as_str())
            .with("createdBy", self.created_by.as_str())
            .with("timestamp", self.timestamp)
    }

    /// The name is re-normalized on read, so a peer that wrote a mixed-case
    /// name still lands on the canonical key.
    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        if node.is_sentinel() {
            return Err(DecodeError::Sentinel);
        }
        let raw = node.get_str("name").ok_or(DecodeError::MissingField("name"))?;
        let name = ChannelName::normalize(raw).ok_or_else(|| DecodeError::InvalidField {
            field: "name",
            reason: format!("not a channel name: {raw:?}"),
        })?;
        Ok(Self {
            name,
            created_by: node.get_str("createdBy").unwrap_or_default().to_string(),
            timestamp: node.get_u64("timestamp").unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Media,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Media => "media",
        }
    }
}

/// A chat message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store key; not part of the stored node.
    pub id: MessageId,
    pub kind: MessageKind,
    pub text: Option<String>,
    /// Media URL for `kind == Media`.
    pub content: Option<String>,
    pub sender: String,
    pub timestamp: u64,
    pub channel: String,
}

impl Message {
    pub fn to_node(&self) -> Node {
        let mut node = Node::new()
            .with("type", self.kind.as_str())
            .with("sender", self.sender.as_str())
            .with("timestamp", self.timestamp)
            .with("channel", self.channel.as_str());
        if let Some(ref text) = self.text {
            node.insert("text", text.as_str());
        }
        if let Some(ref content) = self.content {
            node.insert("content", content.as_str());
        }
        node
    }

    /// Decode and validate a record read from `messages/<channel>/<key>`.
    ///
    /// A message needs `sender` and `timestamp`, plus `text` when it is a
    /// text message or `content` when it is a media message. Sentinels and
    /// partial writes are rejected.
    pub fn from_node(key: &str, channel: &ChannelName, node: &Node) -> Result<Self, DecodeError> {
        if node.is_sentinel() {
            return Err(DecodeError::Sentinel);
        }
        let sender = node.get_str("sender").ok_or(DecodeError::MissingField("sender"))?;
        let timestamp = node
            .get_u64("timestamp")
            .filter(|ts| *ts > 0)
            .ok_or(DecodeError::MissingField("timestamp"))?;

        let text = node.get_str("text").map(str::to_string);
        let content = node.get_str("content").map(str::to_string);

        let kind = match node.get_str("type") {
            Some("text") if text.is_some() => MessageKind::Text,
            Some("media") if content.is_some() => MessageKind::Media,
            Some("text") => return Err(DecodeError::MissingField("text")),
            Some("media") => return Err(DecodeError::MissingField("content")),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: "type",
                    reason: format!("unknown message type {other:?}"),
                })
            }
            None => return Err(DecodeError::MissingField("type")),
        };

        Ok(Self {
            id: MessageId::from_key(key),
            kind,
            text,
            content,
            sender: sender.to_string(),
            timestamp,
            channel: node
                .get_str("channel")
                .unwrap_or(channel.as_str())
                .to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Alias claim at `~@<username>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub public_key: String,
}

impl AliasRecord {
    pub fn to_node(&self) -> Node {
        Node::new().with("pub", self.public_key.as_str())
    }

    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        let public_key = node.get_str("pub").ok_or(DecodeError::MissingField("pub"))?;
        Ok(Self {
            public_key: public_key.to_string(),
        })
    }
}

/// Account node at `~<pub>` holding the password-sealed keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub alias: String,
    pub encryption_public_key: String,
    pub salt: String,
    pub auth: String,
}

impl AccountRecord {
    pub fn to_node(&self) -> Node {
        Node::new()
            .with("alias", self.alias.as_str())
            .with("epub", self.encryption_public_key.as_str())
            .with("salt", self.salt.as_str())
            .with("auth", self.auth.as_str())
    }

    pub fn from_node(node: &Node) -> Result<Self, DecodeError> {
        let field = |name: &'static str| {
            node.get_str(name)
                .map(str::to_string)
                .ok_or(DecodeError::MissingField(name))
        };
        Ok(Self {
            alias: field("alias")?,
            encryption_public_key: field("epub")?,
            salt: field("salt")?,
            auth: field("auth")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SENTINEL_FIELD;

    fn general() -> ChannelName {
        ChannelName::normalize("general").unwrap()
    }

    fn text_node() -> Node {
        Node::new()
            .with("type", "text")
            .with("text", "hi")
            .with("sender", "alice")
            .with("timestamp", 1_700_000_000_000u64)
            .with("channel", "general")
    }

    #[test]
    fn test_valid_text_message() {
        let msg = Message::from_node("k1", &general(), &text_node()).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.text.as_deref(), Some("hi"));
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.id.as_str(), "k1");
    }

    #[test]
    fn test_sentinel_is_not_a_message() {
        assert_eq!(
            Message::from_node("k", &general(), &Node::sentinel()),
            Err(DecodeError::Sentinel)
        );
        let marked = text_node().with(SENTINEL_FIELD, true);
        assert_eq!(
            Message::from_node("k", &general(), &marked),
            Err(DecodeError::Sentinel)
        );
    }

    #[test]
    fn test_message_requires_sender_and_timestamp() {
        let mut no_sender = Node::new();
        for (k, v) in text_node().fields() {
            if k != "sender" {
                no_sender.insert(k, v.clone());
            }
        }
        assert_eq!(
            Message::from_node("k", &general(), &no_sender),
            Err(DecodeError::MissingField("sender"))
        );

        let no_ts = Node::new()
            .with("type", "text")
            .with("text", "hi")
            .with("sender", "alice");
        assert_eq!(
            Message::from_node("k", &general(), &no_ts),
            Err(DecodeError::MissingField("timestamp"))
        );
    }

    #[test]
    fn test_type_must_match_payload() {
        let media_without_content = text_node().with("type", "media");
        assert!(Message::from_node("k", &general(), &media_without_content).is_err());

        let media = Node::new()
            .with("type", "media")
            .with("content", "https://gateway.pinata.cloud/ipfs/Qm")
            .with("text", "")
            .with("sender", "bob")
            .with("timestamp", 5u64);
        let msg = Message::from_node("k", &general(), &media).unwrap();
        assert_eq!(msg.kind, MessageKind::Media);
        assert_eq!(msg.text, None);
        assert_eq!(msg.channel, "general");
    }

    #[test]
    fn test_message_node_roundtrip_preserves_fields() {
        let msg = Message::from_node("k1", &general(), &text_node()).unwrap();
        assert_eq!(msg.to_node(), text_node());
    }

    #[test]
    fn test_presence_liveness() {
        let now = 1_000_000;
        let window = 30_000;
        let fresh = PresenceRecord {
            online: true,
            last_seen: now - 29_999,
            username: None,
        };
        let stale = PresenceRecord {
            last_seen: now - 31_000,
            ..fresh.clone()
        };
        let offline = PresenceRecord {
            online: false,
            ..fresh.clone()
        };

        assert!(fresh.is_live(now, window));
        assert!(!stale.is_live(now, window));
        assert!(!offline.is_live(now, window));
    }

    #[test]
    fn test_presence_decode_defaults() {
        let record = PresenceRecord::from_node(&Node::new().with("online", true)).unwrap();
        assert_eq!(record.last_seen, 0);
        assert!(!record.is_live(100_000, 30_000));
        assert_eq!(
            PresenceRecord::from_node(&Node::sentinel()),
            Err(DecodeError::Sentinel)
        );
    }

    #[test]
    fn test_mark_stale_touches_only_sweeper_fields() {
        let node = MarkStale.to_node();
        assert_eq!(node.get_bool("online"), Some(false));
        assert_eq!(node.len(), 1);
        assert!(permits(PRESENCE_FIELDS, Writer::Sweeper, "online"));
        assert!(!permits(PRESENCE_FIELDS, Writer::Sweeper, "lastSeen"));
        assert!(permits(PRESENCE_FIELDS, Writer::Owner, "lastSeen"));
    }

    #[test]
    fn test_channel_descriptor_normalizes_on_read() {
        let node = Node::new()
            .with("name", "General")
            .with("createdBy", "bob")
            .with("timestamp", 1u64);
        let desc = ChannelDescriptor::from_node(&node).unwrap();
        assert_eq!(desc.name.as_str(), "general");
        assert!(ChannelDescriptor::from_node(&Node::sentinel()).is_err());
        assert!(ChannelDescriptor::from_node(&Node::new().with("createdBy", "x")).is_err());
    }

    #[test]
    fn test_picture_or_default() {
        let with_pic = Node::new().with("profilePicture", "https://x/y.png");
        assert_eq!(picture_or_default("alice", Some(&with_pic)), "https://x/y.png");
        assert_eq!(
            picture_or_default("alice", None),
            "https://api.dicebear.com/9.x/thumbs/svg?seed=alice"
        );
    }

    #[test]
    fn test_paths() {
        let alice = Username::parse("alice").unwrap();
        assert_eq!(presence_path(&alice).as_str(), "presence/alice");
        assert_eq!(alias_path(&alice).as_str(), "~@alice");
        let id = MessageId::from_key("1-00000001");
        assert_eq!(
            message_path(&general(), &id).as_str(),
            "messages/general/1-00000001"
        );
    }
}
