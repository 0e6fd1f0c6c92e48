use std::sync::Arc;

use crate::control::RunController;
use crate::error::NodeError;
use crate::event::EventSink;
use crate::types::{Event, NodeId, NodeOutput, NodeProgressData};

/// The unit of work behind a node kind.
///
/// Bodies are called with their resolved inputs (one value per input slot)
/// and run on the engine's worker pool, so they may block. Long-running
/// bodies should call [`NodeContext::suspend`] periodically to honour
/// pause and kill.
pub trait NodeBody: Send + Sync + 'static {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError>;
}

impl<F> NodeBody for F
where
    F: Fn(Vec<serde_json::Value>, &NodeContext) -> Result<NodeOutput, NodeError>
        + Send
        + Sync
        + 'static,
{
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        self(inputs, ctx)
    }
}

/// What a node body can see of the run it belongs to.
#[derive(Clone)]
pub struct NodeContext {
    node_id: NodeId,
    controller: RunController,
    events: EventSink,
    options: Arc<serde_json::Value>,
}

impl NodeContext {
    pub fn new(
        node_id: NodeId,
        controller: RunController,
        events: EventSink,
        options: Arc<serde_json::Value>,
    ) -> Self {
        Self {
            node_id,
            controller,
            events,
            options,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Per-run execution options, passed through untouched from the request.
    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    pub fn is_cancelled(&self) -> bool {
        self.controller.is_killed()
    }

    /// Blocks while the run is paused; `Err(Aborted)` once it is killed.
    pub fn suspend(&self) -> Result<(), NodeError> {
        self.controller.suspend()
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    /// Publish intermediate progress (0.0..=1.0) for this node.
    pub fn report_progress(&self, progress: f32) {
        self.events.put(Event::NodeProgress(NodeProgressData {
            node_id: self.node_id.clone(),
            progress: progress.clamp(0.0, 1.0),
        }));
    }
}
