//! # anontalk-shared
//!
//! Data model shared by the AnonTalk client and relay: graph node and path
//! types, the typed records stored in the graph, keypair identities and the
//! password sealing used for account records.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod node;
pub mod records;
pub mod types;

pub use node::{GraphPath, Node};
pub use types::{now_millis, ChannelName, MessageId, Username};
