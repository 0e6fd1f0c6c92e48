use std::sync::Arc;

use graphrun_core::traits::NodeBody;
use graphrun_core::types::NodeId;
use graphrun_nodes::{NodeSchema, RegisteredNode};

/// A node in the execution graph: identity, kind, and the body to run.
#[derive(Clone)]
pub struct Node {
    pub id: NodeId,
    pub schema: Arc<NodeSchema>,
    pub body: Arc<dyn NodeBody>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, schema: Arc<NodeSchema>, body: Arc<dyn NodeBody>) -> Self {
        Self {
            id: id.into(),
            schema,
            body,
        }
    }

    /// Instantiate a registered node kind under the given id.
    pub fn from_registered(id: impl Into<NodeId>, registered: &RegisteredNode) -> Self {
        Self::new(id, registered.schema.clone(), registered.body.clone())
    }

    pub fn schema_id(&self) -> &str {
        &self.schema.schema_id
    }

    pub fn has_side_effects(&self) -> bool {
        self.schema.has_side_effects
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("schema_id", &self.schema.schema_id)
            .finish()
    }
}
