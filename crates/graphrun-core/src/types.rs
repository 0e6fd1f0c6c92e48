use serde::{Deserialize, Serialize};

/// Identity of a node, unique within one graph.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values produced by one node body.
///
/// `outputs` is indexed by output slot. `broadcast` is an optional preview
/// payload that is forwarded to clients when a run asks for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub outputs: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<serde_json::Value>,
}

impl NodeOutput {
    pub fn new(outputs: Vec<serde_json::Value>) -> Self {
        Self {
            outputs,
            broadcast: None,
        }
    }

    /// Output with a single slot.
    pub fn single(value: serde_json::Value) -> Self {
        Self::new(vec![value])
    }

    /// Output with no slots (side-effect only nodes).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_broadcast(mut self, data: serde_json::Value) -> Self {
        self.broadcast = Some(data);
        self
    }

    pub fn get(&self, slot: usize) -> Option<&serde_json::Value> {
        self.outputs.get(slot)
    }
}

/// Discriminant of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    NodeStart,
    NodeFinish,
    NodeProgress,
    ExecutionError,
    Finish,
    BackendStatus,
    BackendStarted,
    BackendReady,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeStart => "node-start",
            Self::NodeFinish => "node-finish",
            Self::NodeProgress => "node-progress",
            Self::ExecutionError => "execution-error",
            Self::Finish => "finish",
            Self::BackendStatus => "backend-status",
            Self::BackendStarted => "backend-started",
            Self::BackendReady => "backend-ready",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "node-start" => Ok(Self::NodeStart),
            "node-finish" => Ok(Self::NodeFinish),
            "node-progress" => Ok(Self::NodeProgress),
            "execution-error" => Ok(Self::ExecutionError),
            "finish" => Ok(Self::Finish),
            "backend-status" => Ok(Self::BackendStatus),
            "backend-started" => Ok(Self::BackendStarted),
            "backend-ready" => Ok(Self::BackendReady),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStartData {
    pub node_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFinishData {
    pub node_id: NodeId,
    /// Every node finished so far in this run, including this one.
    pub finished: Vec<NodeId>,
    /// Wall-clock time of the node body, in seconds.
    pub execution_time: Option<f64>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProgressData {
    pub node_id: NodeId,
    pub progress: f32,
}

/// Attribution for an execution error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSource {
    pub node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    pub inputs: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorData {
    pub message: String,
    pub exception: String,
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishData {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatusData {
    pub message: String,
    pub progress: f32,
    pub status_progress: Option<f32>,
}

/// A message broadcast from the engine to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    NodeStart(NodeStartData),
    NodeFinish(NodeFinishData),
    NodeProgress(NodeProgressData),
    ExecutionError(ExecutionErrorData),
    Finish(FinishData),
    BackendStatus(BackendStatusData),
    BackendStarted,
    BackendReady,
}

impl Event {
    pub fn node_start(node_id: NodeId) -> Self {
        Self::NodeStart(NodeStartData { node_id })
    }

    pub fn finish(message: impl Into<String>) -> Self {
        Self::Finish(FinishData {
            message: message.into(),
        })
    }

    pub fn backend_status(
        message: impl Into<String>,
        progress: f32,
        status_progress: Option<f32>,
    ) -> Self {
        Self::BackendStatus(BackendStatusData {
            message: message.into(),
            progress,
            status_progress,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeStart(_) => EventKind::NodeStart,
            Self::NodeFinish(_) => EventKind::NodeFinish,
            Self::NodeProgress(_) => EventKind::NodeProgress,
            Self::ExecutionError(_) => EventKind::ExecutionError,
            Self::Finish(_) => EventKind::Finish,
            Self::BackendStatus(_) => EventKind::BackendStatus,
            Self::BackendStarted => EventKind::BackendStarted,
            Self::BackendReady => EventKind::BackendReady,
        }
    }

    /// The node this event is about, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStart(d) => Some(&d.node_id),
            Self::NodeFinish(d) => Some(&d.node_id),
            Self::NodeProgress(d) => Some(&d.node_id),
            Self::ExecutionError(d) => d.source.as_ref().map(|s| &s.node_id),
            _ => None,
        }
    }

    /// JSON payload as sent on the wire (`null` for handshake markers).
    pub fn data(&self) -> serde_json::Value {
        let value = match self {
            Self::NodeStart(d) => serde_json::to_value(d),
            Self::NodeFinish(d) => serde_json::to_value(d),
            Self::NodeProgress(d) => serde_json::to_value(d),
            Self::ExecutionError(d) => serde_json::to_value(d),
            Self::Finish(d) => serde_json::to_value(d),
            Self::BackendStatus(d) => serde_json::to_value(d),
            Self::BackendStarted | Self::BackendReady => Ok(serde_json::Value::Null),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// `{"event": kind, "data": payload}` envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "event": self.kind().as_str(),
            "data": self.data(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_roundtrip_str() {
        for kind in [
            EventKind::NodeStart,
            EventKind::NodeFinish,
            EventKind::NodeProgress,
            EventKind::ExecutionError,
            EventKind::Finish,
            EventKind::BackendStatus,
            EventKind::BackendStarted,
            EventKind::BackendReady,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("node-exploded".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_node_finish_payload_is_camel_case() {
        let event = Event::NodeFinish(NodeFinishData {
            node_id: NodeId::new("a"),
            finished: vec![NodeId::new("a")],
            execution_time: Some(0.5),
            data: None,
        });
        let json = event.to_json();
        assert_eq!(json["event"], "node-finish");
        assert_eq!(json["data"]["nodeId"], "a");
        assert_eq!(json["data"]["executionTime"], 0.5);
        assert_eq!(json["data"]["finished"][0], "a");
    }

    #[test]
    fn test_handshake_events_have_null_data() {
        assert_eq!(Event::BackendReady.data(), serde_json::Value::Null);
        assert_eq!(Event::BackendStarted.kind(), EventKind::BackendStarted);
    }

    #[test]
    fn test_execution_error_source_attribution() {
        let event = Event::ExecutionError(ExecutionErrorData {
            message: "Error running nodes!".into(),
            exception: "boom".into(),
            source: Some(ErrorSource {
                node_id: NodeId::new("b"),
                schema_id: Some("core:add".into()),
                inputs: vec![serde_json::json!(1)],
            }),
        });
        assert_eq!(event.node_id(), Some(&NodeId::new("b")));
        let data = event.data();
        assert_eq!(data["source"]["schemaId"], "core:add");
        assert_eq!(data["source"]["inputs"][0], 1);
    }

    #[test]
    fn test_node_output_slots() {
        let out = NodeOutput::new(vec![serde_json::json!(1), serde_json::json!("x")])
            .with_broadcast(serde_json::json!({"preview": true}));
        assert_eq!(out.get(1), Some(&serde_json::json!("x")));
        assert!(out.get(2).is_none());
        assert!(out.broadcast.is_some());
    }
}
