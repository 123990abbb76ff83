use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of an occurrence in the source's history. Ordering is block
/// first, then log index within the block.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequenceId {
    pub block: u64,
    pub log_index: u32,
}

impl SequenceId {
    pub fn new(block: u64, log_index: u32) -> Self {
        Self { block, log_index }
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.log_index)
    }
}

/// One instance of the watched event. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub event_name: String,
    pub source_address: String,
    /// Decoded event parameters. A BTreeMap keeps key order deterministic
    /// no matter how the source iterated them.
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub sequence: SequenceId,
}

impl Occurrence {
    /// Natural key: (source address, event name, sequence).
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source_address, self.event_name, self.sequence
        )
    }
}

/// Where a new subscription starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FromPoint {
    /// Head of the source at subscribe time; first run only.
    Latest,
    /// Everything strictly after the given position.
    After(SequenceId),
}

impl fmt::Display for FromPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromPoint::Latest => write!(f, "latest"),
            FromPoint::After(seq) => write!(f, "after {}", seq),
        }
    }
}
