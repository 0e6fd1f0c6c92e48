use graphrun_core::error::NodeError;
use graphrun_core::traits::{NodeBody, NodeContext};
use graphrun_core::types::NodeOutput;

use super::input;
use crate::registry::NodeKind;
use crate::schema::NodeSchema;

/// Adds two numbers. Integer inputs stay integers.
pub struct AddNode;

fn number(value: &serde_json::Value, label: &str) -> Result<serde_json::Number, NodeError> {
    match value {
        serde_json::Value::Number(n) => Ok(n.clone()),
        other => Err(NodeError::failed(format!(
            "input '{}' must be a number, got {}",
            label, other
        ))),
    }
}

impl NodeBody for AddNode {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let a = number(input(&inputs, 0, "A")?, "A")?;
        let b = number(input(&inputs, 1, "B")?, "B")?;

        let sum = match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a
                .checked_add(b)
                .map(serde_json::Value::from)
                .ok_or_else(|| NodeError::failed("integer overflow"))?,
            _ => {
                let total = a.as_f64().unwrap_or(f64::NAN) + b.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(total)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| NodeError::failed("result is not a finite number"))?
            }
        };

        Ok(NodeOutput::single(sum.clone()).with_broadcast(serde_json::json!({ "value": sum })))
    }
}

impl NodeKind for AddNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("core:add", "Add")
            .with_category("math")
            .with_description("Adds two numbers.")
            .with_inputs(&["A", "B"])
            .with_outputs(&["Sum"])
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

    fn ctx() -> NodeContext {
        NodeContext::new(
            NodeId::new("n"),
            RunController::new(),
            EventSink::new(Arc::new(EventChannel::new())),
            Arc::new(serde_json::Value::Null),
        )
    }

    #[test]
    fn test_add_integers() {
        let out = AddNode.run(vec![json!(2), json!(40)], &ctx()).unwrap();
        assert_eq!(out.outputs, vec![json!(42)]);
    }

    #[test]
    fn test_add_floats() {
        let out = AddNode.run(vec![json!(1.5), json!(2)], &ctx()).unwrap();
        assert_eq!(out.outputs, vec![json!(3.5)]);
    }

    #[test]
    fn test_add_rejects_strings() {
        let err = AddNode.run(vec![json!("x"), json!(2)], &ctx()).unwrap_err();
        assert!(err.to_string().contains("'A' must be a number"));
    }
}
