//! JSON frames exchanged between a `RemoteGraph` and the relay.
//!
//! One frame per WebSocket text message, tagged by `type`.

use serde::{Deserialize, Serialize};

use anontalk_shared::{GraphPath, Node};

use crate::client::Scope;
use crate::state::StampedFields;

/// Client to relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Put {
        req: u64,
        path: GraphPath,
        fields: StampedFields,
    },
    Get {
        req: u64,
        path: GraphPath,
    },
    Children {
        req: u64,
        path: GraphPath,
    },
    Subscribe {
        sub: u64,
        path: GraphPath,
        scope: Scope,
    },
    Unsubscribe {
        sub: u64,
    },
}

/// Relay to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    Ack {
        req: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<String>,
    },
    Value {
        req: u64,
        #[serde(default)]
        node: Option<Node>,
    },
    Entries {
        req: u64,
        entries: Vec<ChildEntry>,
    },
    Event {
        sub: u64,
        path: GraphPath,
        key: String,
        #[serde(default)]
        node: Option<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub key: String,
    pub node: Node,
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl RelayFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_frame_shape() {
        let frame = ClientFrame::from_json(
            r#"{"type":"put","req":1,"path":"presence/alice",
                "fields":{"online":{"value":true,"state":1700000000000}}}"#,
        )
        .unwrap();

        match frame {
            ClientFrame::Put { req, path, fields } => {
                assert_eq!(req, 1);
                assert_eq!(path.as_str(), "presence/alice");
                assert_eq!(fields["online"].value, json!(true));
                assert_eq!(fields["online"].state, 1_700_000_000_000);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_scope_is_snake_case() {
        let frame = ClientFrame::Subscribe {
            sub: 3,
            path: GraphPath::root("channels"),
            scope: Scope::Children,
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["scope"], "children");
    }

    #[test]
    fn test_ack_omits_empty_error() {
        let ok = RelayFrame::Ack { req: 9, err: None }.to_json().unwrap();
        assert_eq!(ok, r#"{"type":"ack","req":9}"#);

        let parsed = RelayFrame::from_json(r#"{"type":"ack","req":9,"err":"nope"}"#).unwrap();
        assert_eq!(
            parsed,
            RelayFrame::Ack {
                req: 9,
                err: Some("nope".into())
            }
        );
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(ClientFrame::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientFrame::from_json(r#"{"type":"get","req":1,"path":"a//b"}"#).is_err());
        assert!(RelayFrame::from_json("not json").is_err());
    }
}
