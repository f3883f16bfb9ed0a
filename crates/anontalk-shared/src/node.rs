//! Graph node and path types.
//!
//! A node is a flat map of field name to JSON scalar. Nested structure is
//! expressed through paths: the children of `messages/general` are the nodes
//! whose path is `messages/general/<key>`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SENTINEL_FIELD;
use crate::error::DecodeError;

/// Slash-separated location of a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphPath(String);

impl GraphPath {
    /// A single-segment path such as `presence`.
    pub fn root(segment: &str) -> Self {
        Self(escape_segment(segment))
    }

    /// Parse a full path, rejecting empty segments.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        if raw.is_empty() || raw.split('/').any(str::is_empty) {
            return Err(DecodeError::InvalidPath(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Extend the path by one segment. A `/` inside the segment is escaped
    /// so the result always has exactly one more segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}/{}", self.0, escape_segment(segment)))
    }

    pub fn parent(&self) -> Option<GraphPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| GraphPath(parent.to_string()))
    }

    /// Last segment of the path.
    pub fn key(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_child_of(&self, other: &GraphPath) -> bool {
        self.parent().as_ref() == Some(other)
    }
}

fn escape_segment(segment: &str) -> String {
    if segment.is_empty() {
        return "_".to_string();
    }
    segment.replace('/', "%2F")
}

impl fmt::Display for GraphPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GraphPath {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GraphPath::parse(&value)
    }
}

impl From<GraphPath> for String {
    fn from(path: GraphPath) -> Self {
        path.0
    }
}

/// Field values of a single node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(BTreeMap<String, Value>);

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A non-empty string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    /// An integral, non-negative number field. Floats with no fractional
    /// part are accepted since JavaScript peers write `Date.now()` as a
    /// double.
    pub fn get_u64(&self, field: &str) -> Option<u64> {
        let value = self.0.get(field)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// `true` when the node carries the namespace marker. Consumers treat
    /// such records as empty, never as content.
    pub fn is_sentinel(&self) -> bool {
        self.get_bool(SENTINEL_FIELD).unwrap_or(false)
    }

    /// The marker written into namespace roots.
    pub fn sentinel() -> Self {
        Node::new().with(SENTINEL_FIELD, true)
    }
}

impl FromIterator<(String, Value)> for Node {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
