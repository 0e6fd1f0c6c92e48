use graphrun_core::error::NodeError;
use graphrun_core::traits::{NodeBody, NodeContext};
use graphrun_core::types::NodeOutput;

use super::input;
use crate::registry::NodeKind;
use crate::schema::NodeSchema;

/// Passes its literal input through unchanged.
pub struct ValueNode;

impl NodeBody for ValueNode {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = input(&inputs, 0, "Value")?.clone();
        Ok(NodeOutput::single(value.clone()).with_broadcast(serde_json::json!({ "value": value })))
    }
}

impl NodeKind for ValueNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("core:value", "Value")
            .with_category("core")
            .with_description("Outputs the given value.")
            .with_inputs(&["Value"])
            .with_outputs(&["Value"])
    }
}
