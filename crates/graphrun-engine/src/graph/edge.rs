use serde::{Deserialize, Serialize};

use graphrun_core::types::NodeId;

/// A data dependency: output `source_slot` of `source` feeds input
/// `target_slot` of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: NodeId,
    pub source_slot: usize,
    pub target: NodeId,
    pub target_slot: usize,
}

impl Edge {
    pub fn new(
        source: impl Into<NodeId>,
        source_slot: usize,
        target: impl Into<NodeId>,
        target_slot: usize,
    ) -> Self {
        Self {
            source: source.into(),
            source_slot,
            target: target.into(),
            target_slot,
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_slot, self.target, self.target_slot
        )
    }
}
