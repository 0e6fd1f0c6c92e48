use std::collections::HashSet;

use tracing::debug;

use graphrun_core::error::ValidationError;
use graphrun_core::types::NodeId;

use crate::graph::Graph;

/// A rewrite applied to a validated graph before it is scheduled.
pub trait GraphOptimizer: Send + Sync {
    fn optimize(&self, graph: Graph) -> Result<Graph, ValidationError>;
}

/// Leaves the graph untouched.
pub struct NoopOptimizer;

impl GraphOptimizer for NoopOptimizer {
    fn optimize(&self, graph: Graph) -> Result<Graph, ValidationError> {
        Ok(graph)
    }
}

/// Removes nodes whose results nobody observes: no side effects and no
/// outgoing edges. Repeats until nothing changes, so whole dead branches go.
///
/// Only sound when the run does not broadcast previews, since a pruned leaf
/// would otherwise have been shown to the client.
pub struct PruneDeadNodes;

impl GraphOptimizer for PruneDeadNodes {
    fn optimize(&self, mut graph: Graph) -> Result<Graph, ValidationError> {
        loop {
            let dead: HashSet<NodeId> = graph
                .nodes()
                .filter(|n| !n.has_side_effects() && graph.outgoing(&n.id).next().is_none())
                .map(|n| n.id.clone())
                .collect();
            if dead.is_empty() {
                return Ok(graph);
            }
            debug!(pruned = dead.len(), "Pruning dead nodes");
            graph = graph.without(&dead)?;
        }
    }
}
