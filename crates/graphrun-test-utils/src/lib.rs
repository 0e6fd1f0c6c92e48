//! Instrumented node bodies and event helpers for graphrun tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use graphrun_core::error::NodeError;
use graphrun_core::event::EventStream;
use graphrun_core::traits::{NodeBody, NodeContext};
use graphrun_core::types::{Event, NodeOutput};
use graphrun_nodes::NodeSchema;

/// Schema `test:<name>` with `inputs` input slots and one output slot.
pub fn schema(name: &str, inputs: usize) -> NodeSchema {
    let labels: Vec<String> = (0..inputs).map(|i| format!("in{}", i)).collect();
    let labels: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
    NodeSchema::new(format!("test:{}", name), name)
        .with_category("test")
        .with_inputs(&labels)
        .with_outputs(&["out"])
}

/// Counts invocations and outputs `label` followed by its inputs.
#[derive(Clone)]
pub struct CountingBody {
    label: String,
    calls: Arc<AtomicUsize>,
}

impl CountingBody {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NodeBody for CountingBody {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut parts = vec![serde_json::Value::String(self.label.clone())];
        parts.extend(inputs);
        Ok(NodeOutput::single(serde_json::Value::Array(parts))
            .with_broadcast(serde_json::json!({ "label": self.label })))
    }
}

/// Always fails with the given message.
#[derive(Clone)]
pub struct FailingBody {
    message: String,
}

impl FailingBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl NodeBody for FailingBody {
    fn run(
        &self,
        _inputs: Vec<serde_json::Value>,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Err(NodeError::failed(self.message.clone()))
    }
}

#[derive(Default)]
struct GateState {
    started: usize,
    open: bool,
}

/// Blocks inside the worker pool until [`GatedBody::open`] is called.
///
/// With `honour_cancel` the body also returns `Aborted` once the run is
/// killed; without it the body ignores the controller entirely.
#[derive(Clone)]
pub struct GatedBody {
    state: Arc<(Mutex<GateState>, Condvar)>,
    honour_cancel: bool,
    finished: Arc<AtomicBool>,
}

impl GatedBody {
    pub fn new() -> Self {
        Self {
            state: Arc::new((Mutex::new(GateState::default()), Condvar::new())),
            honour_cancel: true,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A body that never looks at the run controller.
    pub fn ignoring_cancel() -> Self {
        Self {
            honour_cancel: false,
            ..Self::new()
        }
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().open = true;
        cvar.notify_all();
    }

    /// Wait until the body has been entered at least once.
    pub async fn started(&self) {
        loop {
            if self.state.0.lock().unwrap().started > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Whether a call has returned.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Default for GatedBody {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBody for GatedBody {
    fn run(
        &self,
        inputs: Vec<serde_json::Value>,
        ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.started += 1;
        cvar.notify_all();
        let result = loop {
            if state.open {
                break Ok(NodeOutput::single(serde_json::Value::Array(inputs)));
            }
            if self.honour_cancel && ctx.is_cancelled() {
                break Err(NodeError::Aborted);
            }
            state = cvar
                .wait_timeout(state, Duration::from_millis(5))
                .unwrap()
                .0;
        };
        self.finished.store(true, Ordering::SeqCst);
        result
    }
}

/// Compact `"<kind> <node>"` form of an event, for ordering assertions.
pub fn describe(event: &Event) -> String {
    match event.node_id() {
        Some(id) => format!("{} {}", event.kind(), id),
        None => event.kind().to_string(),
    }
}

/// Read events until a `finish` or `execution-error` (inclusive), or until
/// nothing arrives for `idle`.
pub async fn collect_run(stream: &mut EventStream, idle: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(idle, stream.recv()).await {
        let last = matches!(event, Event::Finish(_) | Event::ExecutionError(_));
        events.push(event);
        if last {
            break;
        }
    }
    events
}

/// Drain whatever is queued right now.
pub fn drain(stream: &mut EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = stream.try_recv() {
        events.push(event);
    }
    events
}
