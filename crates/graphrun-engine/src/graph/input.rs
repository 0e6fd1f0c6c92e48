use std::collections::HashMap;

use serde_json::Value;

use graphrun_core::error::{GraphrunError, ValidationError};
use graphrun_core::types::NodeId;

use super::Graph;
use crate::cache::OutputCache;

/// Where one input slot gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Value(Value),
    /// Output `slot` of `node`, looked up when the consuming node is dispatched.
    Edge { node: NodeId, slot: usize },
}

/// Per-node, per-slot input sources for one run.
#[derive(Debug, Clone, Default)]
pub struct InputMap {
    sources: HashMap<NodeId, Vec<InputSource>>,
}

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive sources from the graph's edges plus per-slot literals.
    ///
    /// `literals[id][slot]` is `Some` for slots fed by a value. Every input
    /// slot of every node must end up with exactly one source.
    pub fn from_graph(
        graph: &Graph,
        mut literals: HashMap<NodeId, Vec<Option<Value>>>,
    ) -> Result<Self, ValidationError> {
        let mut sources = HashMap::with_capacity(graph.len());

        for node in graph.nodes() {
            let available = node.schema.input_count();
            let mut slots: Vec<Option<InputSource>> = vec![None; available];

            for (slot, value) in literals.remove(&node.id).unwrap_or_default().into_iter().enumerate() {
                let Some(value) = value else { continue };
                if slot >= available {
                    return Err(ValidationError::InputOutOfRange {
                        node_id: node.id.clone(),
                        slot,
                        available,
                    });
                }
                slots[slot] = Some(InputSource::Value(value));
            }

            for edge in graph.incoming(&node.id) {
                let entry = &mut slots[edge.target_slot];
                if entry.is_some() {
                    return Err(ValidationError::DuplicateInput {
                        node_id: node.id.clone(),
                        slot: edge.target_slot,
                    });
                }
                *entry = Some(InputSource::Edge {
                    node: edge.source.clone(),
                    slot: edge.source_slot,
                });
            }

            let resolved = slots
                .into_iter()
                .enumerate()
                .map(|(slot, source)| {
                    source.ok_or_else(|| ValidationError::UnresolvedInput {
                        node_id: node.id.clone(),
                        slot,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            sources.insert(node.id.clone(), resolved);
        }

        Ok(Self { sources })
    }

    pub fn set(&mut self, id: impl Into<NodeId>, sources: Vec<InputSource>) {
        self.sources.insert(id.into(), sources);
    }

    /// Feed every slot of `id` from a literal, replacing any previous sources.
    pub fn set_values(&mut self, id: impl Into<NodeId>, values: Vec<Value>) {
        self.set(id, values.into_iter().map(InputSource::Value).collect());
    }

    pub fn sources(&self, id: &NodeId) -> Option<&[InputSource]> {
        self.sources.get(id).map(Vec::as_slice)
    }

    /// Resolve the ordered input values of `id` against the run's cache.
    ///
    /// A missing upstream output means the node was dispatched before its
    /// dependencies, which a correct topological order never does.
    pub fn resolve(&self, id: &NodeId, cache: &OutputCache) -> Result<Vec<Value>, GraphrunError> {
        let Some(sources) = self.sources.get(id) else {
            return Err(GraphrunError::UnresolvedInput {
                node_id: id.clone(),
                slot: 0,
            });
        };

        sources
            .iter()
            .enumerate()
            .map(|(slot, source)| match source {
                InputSource::Value(value) => Ok(value.clone()),
                InputSource::Edge { node, slot: out } => cache
                    .get(node)
                    .and_then(|output| output.get(*out))
                    .cloned()
                    .ok_or_else(|| GraphrunError::UnresolvedInput {
                        node_id: id.clone(),
                        slot,
                    }),
            })
            .collect()
    }
}
