use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CHANNEL;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Account name. Doubles as the presence and profile key, so it may not
/// contain a path separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Trim and validate user input. Returns `None` for empty names or names
    /// containing `/`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A channel name in its canonical form: trimmed and lowercase.
///
/// The only way to build one is [`ChannelName::normalize`], so every registry
/// key and message path derived from a `ChannelName` is already case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn normalize(raw: &str) -> Option<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self(name))
    }

    pub fn default_channel() -> Self {
        Self(DEFAULT_CHANNEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store key of a message: send time in milliseconds plus a random suffix,
/// so two sends within the same millisecond never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate(timestamp_ms: u64) -> Self {
        let suffix = rand::rngs::OsRng.next_u32();
        Self(format!("{timestamp_ms}-{suffix:08x}"))
    }

    /// Wrap a key received from the store. Keys written by other clients
    /// need not follow our format.
    pub fn from_key(key: &str) -> Self {
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
