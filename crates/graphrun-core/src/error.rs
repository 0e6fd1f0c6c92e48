use thiserror::Error;

use crate::types::{ErrorSource, ExecutionErrorData, NodeId};

/// Malformed graph, rejected before anything executes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Dependency cycle through nodes: {}", join_ids(.nodes))]
    Cycle { nodes: Vec<NodeId> },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("Edge references unknown node {missing} ({source_node}:{source_slot} -> {target_node}:{target_slot})")]
    DanglingEdge {
        missing: NodeId,
        source_node: NodeId,
        source_slot: usize,
        target_node: NodeId,
        target_slot: usize,
    },

    #[error("Node {node_id} has no output slot {slot} ({available} available)")]
    OutputOutOfRange {
        node_id: NodeId,
        slot: usize,
        available: usize,
    },

    #[error("Node {node_id} has no input slot {slot} ({available} available)")]
    InputOutOfRange {
        node_id: NodeId,
        slot: usize,
        available: usize,
    },

    #[error("Input {slot} of node {node_id} has no value and no incoming edge")]
    UnresolvedInput { node_id: NodeId, slot: usize },

    #[error("Input {slot} of node {node_id} has more than one source")]
    DuplicateInput { node_id: NodeId, slot: usize },
}

impl ValidationError {
    /// The node the error can be attributed to, if a single one.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::Cycle { .. } => None,
            Self::DuplicateNode(id) => Some(id),
            Self::DanglingEdge { target_node, .. } => Some(target_node),
            Self::OutputOutOfRange { node_id, .. }
            | Self::InputOutOfRange { node_id, .. }
            | Self::UnresolvedInput { node_id, .. }
            | Self::DuplicateInput { node_id, .. } => Some(node_id),
        }
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A node body failed while running.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Error in node {schema_id} ({node_id}): {message}")]
pub struct NodeExecutionError {
    pub node_id: NodeId,
    pub schema_id: String,
    /// The resolved inputs the body was called with.
    pub inputs: Vec<serde_json::Value>,
    pub message: String,
}

/// What a node body returns when it does not produce an output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    /// The run was killed and the body stopped early.
    #[error("Node body observed cancellation")]
    Aborted,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum GraphrunError {
    #[error("Invalid graph: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NodeExecution(#[from] NodeExecutionError),

    /// An upstream output was missing when a node's inputs were resolved.
    /// Indicates a scheduling bug, not bad user input.
    #[error("Input {slot} of node {node_id} references an output that has not been produced")]
    UnresolvedInput { node_id: NodeId, slot: usize },

    #[error("Unknown node schema: {0}")]
    UnknownSchema(String),

    #[error("Cannot run another executor while the first one is still running.")]
    AlreadyRunning,

    #[error("No executor to {0}")]
    NoActiveRun(&'static str),

    #[error("Worker pool error: {0}")]
    Worker(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GraphrunError {
    /// Translate into the `execution-error` event payload, attaching as much
    /// node attribution as the error carries.
    pub fn to_error_data(&self, message: impl Into<String>) -> ExecutionErrorData {
        let source = match self {
            Self::NodeExecution(e) => Some(ErrorSource {
                node_id: e.node_id.clone(),
                schema_id: Some(e.schema_id.clone()),
                inputs: e.inputs.clone(),
            }),
            Self::UnresolvedInput { node_id, .. } => Some(ErrorSource {
                node_id: node_id.clone(),
                schema_id: None,
                inputs: vec![],
            }),
            Self::Validation(v) => v.node_id().map(|id| ErrorSource {
                node_id: id.clone(),
                schema_id: None,
                inputs: vec![],
            }),
            _ => None,
        };
        let exception = match self {
            Self::NodeExecution(e) => e.message.clone(),
            other => other.to_string(),
        };
        ExecutionErrorData {
            message: message.into(),
            exception,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_execution_error_carries_attribution() {
        let err = GraphrunError::from(NodeExecutionError {
            node_id: NodeId::new("b"),
            schema_id: "core:add".into(),
            inputs: vec![serde_json::json!("x")],
            message: "expected a number".into(),
        });
        let data = err.to_error_data("Error running nodes!");
        let source = data.source.expect("source attached");
        assert_eq!(source.node_id, NodeId::new("b"));
        assert_eq!(source.schema_id.as_deref(), Some("core:add"));
        assert_eq!(source.inputs, vec![serde_json::json!("x")]);
        assert_eq!(data.exception, "expected a number");
    }

    #[test]
    fn test_cycle_message_lists_nodes() {
        let err = ValidationError::Cycle {
            nodes: vec![NodeId::new("a"), NodeId::new("b")],
        };
        assert_eq!(err.to_string(), "Dependency cycle through nodes: a, b");
        assert!(err.node_id().is_none());
    }

    #[test]
    fn test_validation_error_attributed_to_node() {
        let err = GraphrunError::from(ValidationError::UnresolvedInput {
            node_id: NodeId::new("c"),
            slot: 1,
        });
        let data = err.to_error_data("Error running nodes!");
        assert_eq!(data.source.unwrap().node_id, NodeId::new("c"));
    }

    #[test]
    fn test_control_errors_have_no_source() {
        let data = GraphrunError::NoActiveRun("pause").to_error_data("x");
        assert!(data.source.is_none());
        assert_eq!(data.exception, "No executor to pause");
    }
}
