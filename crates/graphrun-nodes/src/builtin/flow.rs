use std::time::{Duration, Instant};

use tracing::info;

use graphrun_core::error::NodeError;
use graphrun_core::traits::{NodeBody, NodeContext};
use graphrun_core::types::NodeOutput;

use super::{display, input};
use crate::registry::NodeKind;
use crate::schema::NodeSchema;

/// Interval between cancellation checks while sleeping.
const SLEEP_STEP: Duration = Duration::from_millis(10);

/// Waits for the given number of milliseconds, then passes its value through.
///
/// Checks the run controller every few milliseconds, so it pauses and stops
/// promptly along with the run.
pub struct SleepNode;

impl NodeBody for SleepNode {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = input(&inputs, 0, "Value")?.clone();
        let millis = input(&inputs, 1, "Milliseconds")?
            .as_u64()
            .ok_or_else(|| NodeError::failed("input 'Milliseconds' must be a non-negative integer"))?;

        let total = Duration::from_millis(millis);
        let started = Instant::now();
        loop {
            ctx.suspend()?;
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }
            ctx.report_progress(elapsed.as_secs_f32() / total.as_secs_f32());
            std::thread::sleep(SLEEP_STEP.min(total - elapsed));
        }

        Ok(NodeOutput::single(value))
    }
}

impl NodeKind for SleepNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("core:sleep", "Sleep")
            .with_category("flow")
            .with_description("Waits, then outputs its value unchanged.")
            .with_inputs(&["Value", "Milliseconds"])
            .with_outputs(&["Value"])
    }
}

/// Writes its input to the service log.
pub struct LogNode;

impl NodeBody for LogNode {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let value = input(&inputs, 0, "Value")?;
        info!(node_id = %ctx.node_id(), value = %display(value), "Log node");
        Ok(NodeOutput::empty())
    }
}

impl NodeKind for LogNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("core:log", "Log")
            .with_category("flow")
            .with_description("Writes a value to the service log.")
            .with_inputs(&["Value"])
            .with_side_effects(true)
    }
}
