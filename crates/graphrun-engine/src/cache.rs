//! Two-layer output cache: a read-only parent snapshot and the entries
//! produced by the current run.

use std::collections::HashMap;
use std::sync::Arc;

use graphrun_core::types::{NodeId, NodeOutput};

/// Outputs carried over from earlier runs, keyed by node id.
pub type CacheSnapshot = Arc<HashMap<NodeId, NodeOutput>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Adopted from the parent snapshot without running the node.
    Reused,
    /// Produced by running the node in this run.
    Computed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub output: NodeOutput,
    pub provenance: Provenance,
}

#[derive(Debug, Default)]
pub struct OutputCache {
    parent: CacheSnapshot,
    live: HashMap<NodeId, CacheEntry>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that consults `parent` for nodes the run has not produced.
    /// The parent is trusted as-is and never written.
    pub fn with_parent(parent: CacheSnapshot) -> Self {
        Self {
            parent,
            live: HashMap::new(),
        }
    }

    /// Live layer first, then the parent.
    pub fn get(&self, id: &NodeId) -> Option<&NodeOutput> {
        self.live
            .get(id)
            .map(|e| &e.output)
            .or_else(|| self.parent.get(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.live.contains_key(id) || self.parent.contains_key(id)
    }

    /// Record a freshly computed output.
    pub fn put(&mut self, id: NodeId, output: NodeOutput) {
        self.live.insert(
            id,
            CacheEntry {
                output,
                provenance: Provenance::Computed,
            },
        );
    }

    /// Copy the parent's entry for `id` into the live layer. Returns false if
    /// neither layer has it.
    pub fn adopt(&mut self, id: &NodeId) -> bool {
        if self.live.contains_key(id) {
            return true;
        }
        match self.parent.get(id) {
            Some(output) => {
                self.live.insert(
                    id.clone(),
                    CacheEntry {
                        output: output.clone(),
                        provenance: Provenance::Reused,
                    },
                );
                true
            }
            None => false,
        }
    }

    pub fn entry(&self, id: &NodeId) -> Option<&CacheEntry> {
        self.live.get(id)
    }

    /// Outputs computed by this run.
    pub fn computed(&self) -> impl Iterator<Item = (&NodeId, &NodeOutput)> {
        self.live
            .iter()
            .filter(|(_, e)| e.provenance == Provenance::Computed)
            .map(|(id, e)| (id, &e.output))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
