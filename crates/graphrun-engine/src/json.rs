//! Request bodies as sent by clients, and their translation into a graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use graphrun_core::error::Result;
use graphrun_core::types::NodeId;
use graphrun_nodes::NodeRegistry;

use crate::graph::{Edge, Graph, InputMap, Node};

/// One node of a submitted graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonNode {
    pub id: NodeId,
    pub schema_id: String,
    /// One entry per input slot, in slot order.
    #[serde(default)]
    pub inputs: Vec<JsonInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonInput {
    Value {
        #[serde(default)]
        value: Value,
    },
    /// Output `index` of node `id`.
    Edge { id: NodeId, index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub data: Vec<JsonNode>,
    /// Passed through untouched to every node body.
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub send_broadcast_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIndividualRequest {
    pub id: NodeId,
    #[serde(default)]
    pub inputs: Vec<Value>,
    pub schema_id: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheRequest {
    pub id: NodeId,
}

/// Build the graph and its input map from submitted nodes.
pub fn parse_json(data: &[JsonNode], registry: &NodeRegistry) -> Result<(Graph, InputMap)> {
    let mut nodes = Vec::with_capacity(data.len());
    let mut edges = Vec::new();
    let mut literals = HashMap::with_capacity(data.len());

    for json in data {
        let registered = registry.resolve(&json.schema_id)?;
        nodes.push(Node::from_registered(json.id.clone(), registered));

        let mut values = Vec::with_capacity(json.inputs.len());
        for (slot, input) in json.inputs.iter().enumerate() {
            match input {
                JsonInput::Value { value } => values.push(Some(value.clone())),
                JsonInput::Edge { id, index } => {
                    edges.push(Edge::new(id.clone(), *index, json.id.clone(), slot));
                    values.push(None);
                }
            }
        }
        literals.insert(json.id.clone(), values);
    }

    let graph = Graph::build(nodes, edges)?;
    let inputs = InputMap::from_graph(&graph, literals)?;
    Ok((graph, inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphrun_core::error::{GraphrunError, ValidationError};
    use serde_json::json;

    fn request(body: Value) -> RunRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_run_request_wire_format() {
        let req = request(json!({
            "data": [
                {"id": "a", "schemaId": "core:value", "inputs": [{"type": "value", "value": 2}]},
                {"id": "b", "schemaId": "core:add", "inputs": [
                    {"type": "edge", "id": "a", "index": 0},
                    {"type": "value", "value": 3}
                ]}
            ],
            "options": {"gpu": 0},
            "sendBroadcastData": true
        }));

        assert!(req.send_broadcast_data);
        assert_eq!(req.options, json!({"gpu": 0}));
        assert_eq!(
            req.data[1].inputs[0],
            JsonInput::Edge {
                id: NodeId::new("a"),
                index: 0
            }
        );

        let (graph, inputs) = parse_json(&req.data, &NodeRegistry::with_builtins()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges(), &[Edge::new("a", 0, "b", 0)]);
        assert_eq!(inputs.sources(&NodeId::new("b")).unwrap().len(), 2);
    }

    #[test]
    fn test_defaults() {
        let req = request(json!({"data": []}));
        assert!(!req.send_broadcast_data);
        assert!(req.options.is_null());
    }

    #[test]
    fn test_unknown_schema() {
        let req = request(json!({"data": [{"id": "a", "schemaId": "x:nope", "inputs": []}]}));
        let err = parse_json(&req.data, &NodeRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, GraphrunError::UnknownSchema(_)));
    }

    #[test]
    fn test_missing_input_rejected() {
        let req = request(json!({"data": [
            {"id": "a", "schemaId": "core:add", "inputs": [{"type": "value", "value": 1}]}
        ]}));
        let err = parse_json(&req.data, &NodeRegistry::with_builtins()).unwrap_err();
        assert!(matches!(
            err,
            GraphrunError::Validation(ValidationError::UnresolvedInput { slot: 1, .. })
        ));
    }

    #[test]
    fn test_individual_request() {
        let req: RunIndividualRequest = serde_json::from_value(json!({
            "id": "n1", "schemaId": "core:add", "inputs": [1, 2], "options": {}
        }))
        .unwrap();
        assert_eq!(req.id, NodeId::new("n1"));
        assert_eq!(req.inputs, vec![json!(1), json!(2)]);
    }
}
