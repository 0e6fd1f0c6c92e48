use std::collections::HashMap;
use std::sync::Arc;

use graphrun_core::error::{GraphrunError, Result};
use graphrun_core::traits::NodeBody;

use crate::schema::NodeSchema;

/// A node kind that knows its own schema.
pub trait NodeKind: NodeBody {
    fn schema(&self) -> NodeSchema;
}

/// Schema and body registered under one schema id.
#[derive(Clone)]
pub struct RegisteredNode {
    pub schema: Arc<NodeSchema>,
    pub body: Arc<dyn NodeBody>,
}

/// Registry of available node kinds, keyed by schema id.
pub struct NodeRegistry {
    nodes: HashMap<String, RegisteredNode>,
    order: Vec<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a self-describing node kind.
    pub fn register(&mut self, kind: impl NodeKind) {
        let schema = kind.schema();
        self.register_body(schema, kind);
    }

    /// Register a body under an explicit schema. Replaces any previous
    /// registration with the same schema id.
    pub fn register_body(&mut self, schema: NodeSchema, body: impl NodeBody) {
        let id = schema.schema_id.clone();
        if !self.nodes.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.nodes.insert(
            id,
            RegisteredNode {
                schema: Arc::new(schema),
                body: Arc::new(body),
            },
        );
    }

    pub fn get(&self, schema_id: &str) -> Option<&RegisteredNode> {
        self.nodes.get(schema_id)
    }

    /// Like [`NodeRegistry::get`], failing with `UnknownSchema`.
    pub fn resolve(&self, schema_id: &str) -> Result<&RegisteredNode> {
        self.get(schema_id)
            .ok_or_else(|| GraphrunError::UnknownSchema(schema_id.to_string()))
    }

    /// All schemas in registration order.
    pub fn schemas(&self) -> Vec<Arc<NodeSchema>> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.schema.clone())
            .collect()
    }

    /// Distinct categories in registration order.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for schema in self.schemas() {
            if !categories.contains(&schema.category) {
                categories.push(schema.category.clone());
            }
        }
        categories
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a registry with all built-in node kinds registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(crate::builtin::value::ValueNode);
        registry.register(crate::builtin::math::AddNode);
        registry.register(crate::builtin::text::ConcatNode);
        registry.register(crate::builtin::flow::SleepNode);
        registry.register(crate::builtin::flow::LogNode);

        registry
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
