//! Field-level merge state.
//!
//! Every stored field carries the state stamp of the write that produced it.
//! Merging an incoming field keeps whichever side has the higher stamp; equal
//! stamps resolve to the lexically greater JSON serialization so every
//! replica picks the same winner regardless of delivery order.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use anontalk_shared::{now_millis, Node};

/// A field value together with its merge stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped {
    pub value: Value,
    pub state: u64,
}

/// Stamped fields of one node, as stored and as carried on the wire.
pub type StampedFields = BTreeMap<String, Stamped>;

/// Issues strictly increasing millisecond stamps for one writer.
///
/// Stamps track the wall clock but never repeat or go backwards, so two
/// writes from the same process within one millisecond still order.
#[derive(Debug, Default)]
pub struct StateClock {
    last: AtomicU64,
}

impl StateClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = now_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    /// Stamp every field of `node` with one fresh state.
    pub fn stamp(&self, node: Node) -> StampedFields {
        let state = self.next();
        node.fields()
            .map(|(field, value)| {
                (
                    field.clone(),
                    Stamped {
                        value: value.clone(),
                        state,
                    },
                )
            })
            .collect()
    }
}

/// Whether `incoming` should replace `current`.
pub fn wins(incoming: &Stamped, current: &Stamped) -> bool {
    match incoming.state.cmp(&current.state) {
        CmpOrdering::Greater => true,
        CmpOrdering::Less => false,
        CmpOrdering::Equal => {
            let a = serde_json::to_string(&incoming.value).unwrap_or_default();
            let b = serde_json::to_string(&current.value).unwrap_or_default();
            a > b
        }
    }
}

/// Merge `incoming` into `stored`. Returns `true` if any field changed.
pub fn merge(stored: &mut StampedFields, incoming: StampedFields) -> bool {
    let mut changed = false;
    for (field, candidate) in incoming {
        match stored.get(&field) {
            Some(current) if !wins(&candidate, current) => {}
            _ => {
                stored.insert(field, candidate);
                changed = true;
            }
        }
    }
    changed
}

/// Plain field values of a stored node.
pub fn materialize(stored: &StampedFields) -> Node {
    stored
        .iter()
        .map(|(field, stamped)| (field.clone(), stamped.value.clone()))
        .collect()
}
