//! Execution graph: nodes, data-dependency edges, and per-slot input sources.
//!
//! A [`Graph`] is validated once on construction (unique ids, edges between
//! existing nodes and slots, at most one edge per input slot, no cycles) and
//! is read-only afterwards. Its topological order is fixed at build time, with
//! ties among ready nodes broken by construction order so runs are
//! reproducible.

pub mod edge;
pub mod input;
pub mod node;

use std::collections::{BTreeSet, HashMap, HashSet};

use graphrun_core::error::ValidationError;
use graphrun_core::types::NodeId;

pub use edge::Edge;
pub use input::{InputMap, InputSource};
pub use node::Node;

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    order: Vec<usize>,
}

impl Graph {
    /// Validate and build a graph.
    pub fn build(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, ValidationError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(ValidationError::DuplicateNode(node.id.clone()));
            }
        }

        let mut fed_slots = HashSet::new();
        for edge in &edges {
            let source = *index
                .get(&edge.source)
                .ok_or_else(|| dangling(edge, &edge.source))?;
            let target = *index
                .get(&edge.target)
                .ok_or_else(|| dangling(edge, &edge.target))?;

            let available = nodes[source].schema.output_count();
            if edge.source_slot >= available {
                return Err(ValidationError::OutputOutOfRange {
                    node_id: edge.source.clone(),
                    slot: edge.source_slot,
                    available,
                });
            }
            let available = nodes[target].schema.input_count();
            if edge.target_slot >= available {
                return Err(ValidationError::InputOutOfRange {
                    node_id: edge.target.clone(),
                    slot: edge.target_slot,
                    available,
                });
            }
            if !fed_slots.insert((target, edge.target_slot)) {
                return Err(ValidationError::DuplicateInput {
                    node_id: edge.target.clone(),
                    slot: edge.target_slot,
                });
            }
        }

        let order = topological_sort(&nodes, &index, &edges)?;
        Ok(Self {
            nodes,
            index,
            edges,
            order,
        })
    }

    /// A graph holding one node and no edges.
    pub fn single(node: Node) -> Self {
        let index = HashMap::from([(node.id.clone(), 0)]);
        Self {
            nodes: vec![node],
            index,
            edges: vec![],
            order: vec![0],
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in construction order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes such that each appears after every node it depends on.
    pub fn topological_order(&self) -> impl Iterator<Item = &Node> + '_ {
        self.order.iter().map(move |&i| &self.nodes[i])
    }

    /// Edges feeding `id`.
    pub fn incoming<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.target == id)
    }

    /// Edges leaving `id`.
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// The subgraph without `removed` and every edge touching them.
    pub fn without(self, removed: &HashSet<NodeId>) -> Result<Self, ValidationError> {
        let nodes = self
            .nodes
            .into_iter()
            .filter(|n| !removed.contains(&n.id))
            .collect();
        let edges = self
            .edges
            .into_iter()
            .filter(|e| !removed.contains(&e.source) && !removed.contains(&e.target))
            .collect();
        Self::build(nodes, edges)
    }
}

fn dangling(edge: &Edge, missing: &NodeId) -> ValidationError {
    ValidationError::DanglingEdge {
        missing: missing.clone(),
        source_node: edge.source.clone(),
        source_slot: edge.source_slot,
        target_node: edge.target.clone(),
        target_slot: edge.target_slot,
    }
}

/// Kahn's algorithm, always taking the lowest construction index among the
/// ready nodes.
fn topological_sort(
    nodes: &[Node],
    index: &HashMap<NodeId, usize>,
    edges: &[Edge],
) -> Result<Vec<usize>, ValidationError> {
    let n = nodes.len();
    let mut indegree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in edges {
        let (s, t) = (index[&edge.source], index[&edge.target]);
        successors[s].push(t);
        indegree[t] += 1;
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &t in &successors[i] {
            indegree[t] -= 1;
            if indegree[t] == 0 {
                ready.insert(t);
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    // Nodes left over are on a cycle or downstream of one; peel off the
    // downstream ones so the error names only the cycle.
    let mut remaining: HashSet<usize> = (0..n).filter(|&i| indegree[i] > 0).collect();
    loop {
        let sinks: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|&i| !successors[i].iter().any(|t| remaining.contains(t)))
            .collect();
        if sinks.is_empty() {
            break;
        }
        for i in sinks {
            remaining.remove(&i);
        }
    }
    let mut cycle: Vec<usize> = remaining.into_iter().collect();
    cycle.sort_unstable();
    Err(ValidationError::Cycle {
        nodes: cycle.into_iter().map(|i| nodes[i].id.clone()).collect(),
    })
}
