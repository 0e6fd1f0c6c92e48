use graphrun_core::error::NodeError;
use graphrun_core::traits::{NodeBody, NodeContext};
use graphrun_core::types::NodeOutput;

use super::{display, input};
use crate::registry::NodeKind;
use crate::schema::NodeSchema;

/// Joins two values as text with a separator.
pub struct ConcatNode;

impl NodeBody for ConcatNode {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let left = display(input(&inputs, 0, "Left")?);
        let right = display(input(&inputs, 1, "Right")?);
        let separator = display(input(&inputs, 2, "Separator")?);

        let joined = format!("{}{}{}", left, separator, right);
        Ok(NodeOutput::single(serde_json::Value::String(joined.clone()))
            .with_broadcast(serde_json::json!({ "text": joined })))
    }
}

impl NodeKind for ConcatNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("core:concat", "Concatenate")
            .with_category("text")
            .with_description("Joins two values as text.")
            .with_inputs(&["Left", "Right", "Separator"])
            .with_outputs(&["Text"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use graphrun_core::control::RunController;
    use graphrun_core::event::{EventChannel, EventSink};
    use graphrun_core::types::NodeId;
    use serde_json::json;

    #[test]
    fn test_concat_mixed_values() {
        let ctx = NodeContext::new(
            NodeId::new("n"),
            RunController::new(),
            EventSink::new(Arc::new(EventChannel::new())),
            Arc::new(json!({})),
        );
        let out = ConcatNode
            .run(vec![json!("frame"), json!(7), json!("-")], &ctx)
            .unwrap();
        assert_eq!(out.outputs, vec![json!("frame-7")]);
        assert_eq!(out.broadcast, Some(json!({ "text": "frame-7" })));
    }
}
