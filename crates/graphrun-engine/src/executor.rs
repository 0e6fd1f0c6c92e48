use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use graphrun_core::control::{RunController, RunState};
use graphrun_core::error::{GraphrunError, NodeError, NodeExecutionError, Result};
use graphrun_core::event::EventSink;
use graphrun_core::traits::NodeContext;
use graphrun_core::types::{Event, NodeFinishData, NodeId, NodeOutput};

use crate::cache::{CacheSnapshot, OutputCache};
use crate::graph::{Graph, InputMap, Node};
use crate::pool::WorkerPool;

/// How long a killed run waits for the in-flight body by default.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(250);

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped by a kill request.
    Aborted,
}

enum Dispatch {
    Done,
    Aborted,
}

/// Drives one run: walks the graph in dependency order, skips nodes the
/// cache already has, and dispatches the rest onto the worker pool.
///
/// Failures are published as `execution-error` before being returned, so
/// callers must not publish them again.
pub struct Executor {
    graph: Graph,
    inputs: InputMap,
    cache: OutputCache,
    controller: RunController,
    events: EventSink,
    pool: WorkerPool,
    options: Arc<Value>,
    send_broadcast_data: bool,
    kill_grace: Duration,
    finished: Vec<NodeId>,
}

impl Executor {
    pub fn new(graph: Graph, inputs: InputMap, events: EventSink, pool: WorkerPool) -> Self {
        Self {
            graph,
            inputs,
            cache: OutputCache::new(),
            controller: RunController::new(),
            events,
            pool,
            options: Arc::new(Value::Null),
            send_broadcast_data: false,
            kill_grace: DEFAULT_KILL_GRACE,
            finished: Vec::new(),
        }
    }

    /// An executor over a one-node graph whose inputs are all literals.
    pub fn single(node: Node, inputs: Vec<Value>, events: EventSink, pool: WorkerPool) -> Self {
        let mut map = InputMap::new();
        map.set_values(node.id.clone(), inputs);
        Self::new(Graph::single(node), map, events, pool)
    }

    /// Reuse outputs from an earlier run without re-executing those nodes.
    pub fn with_parent_cache(mut self, parent: CacheSnapshot) -> Self {
        self.cache = OutputCache::with_parent(parent);
        self
    }

    pub fn with_controller(mut self, controller: RunController) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Attach each node's preview payload to its `node-finish` event.
    pub fn with_broadcast(mut self, send_broadcast_data: bool) -> Self {
        self.send_broadcast_data = send_broadcast_data;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }

    pub fn into_cache(self) -> OutputCache {
        self.cache
    }

    /// Run every node once, then publish `finish`.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        info!(nodes = self.graph.len(), "Running graph");
        let started = Instant::now();
        let order: Vec<Node> = self.graph.topological_order().cloned().collect();

        for node in order {
            if !self.ready_to_dispatch().await {
                info!(node_id = %node.id, "Run killed before dispatch");
                return Ok(RunOutcome::Aborted);
            }

            if self.cache.adopt(&node.id) {
                debug!(node_id = %node.id, "Cache hit, skipping node");
                continue;
            }

            if let Dispatch::Aborted = self.process_node(&node).await? {
                return Ok(RunOutcome::Aborted);
            }
        }

        info!(
            nodes = self.graph.len(),
            computed = self.finished.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Graph run complete"
        );
        self.events.put(Event::finish("Successfully ran nodes!"));
        Ok(RunOutcome::Completed)
    }

    /// Run the graph's only node and return its output, or `None` if the
    /// run was killed first. No `finish` event is published.
    pub async fn run_single(&mut self) -> Result<Option<NodeOutput>> {
        let Some(node) = self.graph.topological_order().next().cloned() else {
            return Ok(None);
        };
        if !self.ready_to_dispatch().await {
            return Ok(None);
        }
        if !self.cache.adopt(&node.id) {
            if let Dispatch::Aborted = self.process_node(&node).await? {
                return Ok(None);
            }
        }
        Ok(self.cache.get(&node.id).cloned())
    }

    /// Suspension point before each dispatch: waits out a pause and reports
    /// whether the run may continue.
    async fn ready_to_dispatch(&self) -> bool {
        match self.controller.state() {
            RunState::Running => true,
            RunState::Killed => false,
            RunState::Paused => {
                debug!("Run paused, waiting");
                self.controller.wait_while_paused().await == RunState::Running
            }
        }
    }

    async fn process_node(&mut self, node: &Node) -> Result<Dispatch> {
        let inputs = match self.inputs.resolve(&node.id, &self.cache) {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(node_id = %node.id, error = %e, "Input resolution failed");
                self.publish_error(&e);
                return Err(e);
            }
        };

        self.events.put(Event::node_start(node.id.clone()));
        debug!(node_id = %node.id, schema_id = %node.schema_id(), "Dispatching node");
        let started = Instant::now();

        let result = {
            let pool = self.pool.clone();
            let controller = self.controller.clone();
            let ctx = NodeContext::new(
                node.id.clone(),
                controller.clone(),
                self.events.clone(),
                self.options.clone(),
            );
            let body = node.body.clone();
            let call_inputs = inputs.clone();
            let job = pool.run(move || body.run(call_inputs, &ctx));
            tokio::pin!(job);

            let finished = tokio::select! {
                result = &mut job => Some(result),
                _ = controller.killed() => None,
            };
            match finished {
                Some(result) => result,
                None => {
                    match tokio::time::timeout(self.kill_grace, &mut job).await {
                        Ok(_) => debug!(node_id = %node.id, "Node body stopped after kill"),
                        Err(_) => warn!(
                            node_id = %node.id,
                            grace_ms = self.kill_grace.as_millis() as u64,
                            "Node body still running after kill, abandoning it"
                        ),
                    }
                    return Ok(Dispatch::Aborted);
                }
            }
        };
        let elapsed = started.elapsed();

        let expected = node.schema.output_count();
        let message = match result {
            Ok(Ok(output)) if output.outputs.len() != expected => format!(
                "expected {} outputs, got {}",
                expected,
                output.outputs.len()
            ),
            Ok(Ok(output)) => {
                debug!(
                    node_id = %node.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Node finished"
                );
                self.finished.push(node.id.clone());
                let data = if self.send_broadcast_data {
                    output.broadcast.clone()
                } else {
                    None
                };
                self.cache.put(node.id.clone(), output);
                self.events.put(Event::NodeFinish(NodeFinishData {
                    node_id: node.id.clone(),
                    finished: self.finished.clone(),
                    execution_time: Some(elapsed.as_secs_f64()),
                    data,
                }));
                return Ok(Dispatch::Done);
            }
            Ok(Err(NodeError::Aborted)) => {
                debug!(node_id = %node.id, "Node body aborted");
                return Ok(Dispatch::Aborted);
            }
            Ok(Err(NodeError::Failed(message))) => message,
            Err(worker) => worker.to_string(),
        };

        let err = GraphrunError::from(NodeExecutionError {
            node_id: node.id.clone(),
            schema_id: node.schema_id().to_string(),
            inputs,
            message,
        });
        error!(node_id = %node.id, schema_id = %node.schema_id(), error = %err, "Node failed");
        self.publish_error(&err);
        Err(err)
    }

    fn publish_error(&self, err: &GraphrunError) {
        self.events
            .put(Event::ExecutionError(err.to_error_data("Error running nodes!")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use graphrun_core::event::EventChannel;
    use graphrun_core::types::EventKind;
    use graphrun_test_utils::{collect_run, describe, drain, schema, CountingBody, FailingBody, GatedBody};
    use serde_json::json;

    use crate::graph::{Edge, InputSource};

    struct Fixture {
        channel: Arc<EventChannel>,
        pool: WorkerPool,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                channel: Arc::new(EventChannel::new()),
                pool: WorkerPool::new(2),
            }
        }

        fn executor(&self, graph: Graph, inputs: InputMap) -> Executor {
            Executor::new(graph, inputs, EventSink::new(self.channel.clone()), self.pool.clone())
        }
    }

    fn node(id: &str, inputs: usize, body: impl graphrun_core::traits::NodeBody) -> Node {
        Node::new(id, Arc::new(schema(id, inputs)), Arc::new(body))
    }

    /// a -> b -> c, `a` fed by a literal.
    fn chain(a: CountingBody, b: Node, c: CountingBody) -> (Graph, InputMap) {
        let graph = Graph::build(
            vec![node("a", 1, a), b, node("c", 1, c)],
            vec![Edge::new("a", 0, "b", 0), Edge::new("b", 0, "c", 0)],
        )
        .unwrap();
        let literals = HashMap::from([(NodeId::new("a"), vec![Some(json!(1))])]);
        let inputs = InputMap::from_graph(&graph, literals).unwrap();
        (graph, inputs)
    }

    fn described(events: &[Event]) -> Vec<String> {
        events.iter().map(describe).collect()
    }

    #[tokio::test]
    async fn test_chain_event_order() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let (graph, inputs) = chain(
            CountingBody::new("a"),
            node("b", 1, CountingBody::new("b")),
            CountingBody::new("c"),
        );

        let mut executor = fx.executor(graph, inputs);
        assert_eq!(executor.run().await.unwrap(), RunOutcome::Completed);

        assert_eq!(
            described(&drain(&mut stream)),
            vec![
                "node-start a",
                "node-finish a",
                "node-start b",
                "node-finish b",
                "node-start c",
                "node-finish c",
                "finish",
            ]
        );
        let c = executor.cache().get(&NodeId::new("c")).unwrap();
        assert_eq!(c.outputs[0], json!(["c", ["b", ["a", 1]]]));
    }

    #[tokio::test]
    async fn test_parent_cache_skips_node() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let a = CountingBody::new("a");
        let (graph, inputs) = chain(
            a.clone(),
            node("b", 1, CountingBody::new("b")),
            CountingBody::new("c"),
        );
        let parent = Arc::new(HashMap::from([(
            NodeId::new("a"),
            NodeOutput::single(json!("cached")),
        )]));

        let mut executor = fx.executor(graph, inputs).with_parent_cache(parent);
        executor.run().await.unwrap();

        assert_eq!(a.calls(), 0);
        assert_eq!(
            described(&drain(&mut stream)),
            vec![
                "node-start b",
                "node-finish b",
                "node-start c",
                "node-finish c",
                "finish",
            ]
        );
    }

    #[tokio::test]
    async fn test_full_parent_cache_emits_only_finish() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let (a, b, c) = (
            CountingBody::new("a"),
            CountingBody::new("b"),
            CountingBody::new("c"),
        );
        let (graph, inputs) = chain(a.clone(), node("b", 1, b.clone()), c.clone());

        let mut first = fx.executor(graph.clone(), inputs.clone());
        first.run().await.unwrap();
        let parent: HashMap<NodeId, NodeOutput> = first
            .into_cache()
            .computed()
            .map(|(id, out)| (id.clone(), out.clone()))
            .collect();
        drain(&mut stream);

        let mut second = fx.executor(graph, inputs).with_parent_cache(Arc::new(parent));
        second.run().await.unwrap();

        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
        assert_eq!(described(&drain(&mut stream)), vec!["finish"]);
    }

    #[tokio::test]
    async fn test_failure_stops_run_with_attribution() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let c = CountingBody::new("c");
        let (graph, inputs) = chain(
            CountingBody::new("a"),
            node("b", 1, FailingBody::new("bad input")),
            c.clone(),
        );

        let err = fx.executor(graph, inputs).run().await.unwrap_err();
        assert!(matches!(err, GraphrunError::NodeExecution(ref e) if e.node_id.as_str() == "b"));
        assert_eq!(c.calls(), 0);

        let events = drain(&mut stream);
        assert_eq!(
            described(&events),
            vec!["node-start a", "node-finish a", "node-start b", "execution-error b"]
        );
        let Event::ExecutionError(data) = &events[3] else {
            panic!("expected execution-error");
        };
        let source = data.source.as_ref().unwrap();
        assert_eq!(source.schema_id.as_deref(), Some("test:b"));
        assert_eq!(source.inputs, vec![json!(["a", 1])]);
        assert_eq!(data.exception, "bad input");
    }

    struct NoOutputs;

    impl graphrun_core::traits::NodeBody for NoOutputs {
        fn run(&self, _inputs: Vec<Value>, _ctx: &NodeContext) -> std::result::Result<NodeOutput, NodeError> {
            Ok(NodeOutput::empty())
        }
    }

    #[tokio::test]
    async fn test_missing_outputs_blamed_on_producer() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let c = CountingBody::new("c");
        let (graph, inputs) = chain(CountingBody::new("a"), node("b", 1, NoOutputs), c.clone());

        let err = fx.executor(graph, inputs).run().await.unwrap_err();
        let GraphrunError::NodeExecution(e) = &err else {
            panic!("expected a node execution error");
        };
        assert_eq!(e.node_id.as_str(), "b");
        assert_eq!(e.inputs, vec![json!(["a", 1])]);
        assert_eq!(e.message, "expected 1 outputs, got 0");
        assert_eq!(c.calls(), 0);
        assert_eq!(
            described(&drain(&mut stream)),
            vec!["node-start a", "node-finish a", "node-start b", "execution-error b"]
        );
    }

    #[tokio::test]
    async fn test_broadcast_data_only_when_enabled() {
        for enabled in [false, true] {
            let fx = Fixture::new();
            let mut stream = fx.channel.subscribe_filtered([EventKind::NodeFinish]);
            let graph = Graph::single(node("a", 0, CountingBody::new("a")));
            let mut inputs = InputMap::new();
            inputs.set("a", vec![]);

            fx.executor(graph, inputs)
                .with_broadcast(enabled)
                .run()
                .await
                .unwrap();

            let Some(Event::NodeFinish(data)) = stream.try_recv() else {
                panic!("expected node-finish");
            };
            assert_eq!(data.data.is_some(), enabled);
            assert_eq!(data.finished, vec![NodeId::new("a")]);
            assert!(data.execution_time.is_some());
        }
    }

    #[tokio::test]
    async fn test_kill_stops_dispatch_even_if_body_ignores_it() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let gated = GatedBody::ignoring_cancel();
        let c = CountingBody::new("c");
        let (graph, inputs) = chain(CountingBody::new("a"), node("b", 1, gated.clone()), c.clone());

        let mut executor = fx
            .executor(graph, inputs)
            .with_kill_grace(Duration::from_millis(20));
        let controller = executor.controller().clone();
        let run = tokio::spawn(async move { executor.run().await });

        gated.started().await;
        controller.kill();
        let outcome = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run returns despite a stuck body")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(!gated.finished());
        gated.open();

        assert_eq!(c.calls(), 0);
        assert_eq!(
            described(&drain(&mut stream)),
            vec!["node-start a", "node-finish a", "node-start b"]
        );
    }

    #[tokio::test]
    async fn test_cooperative_body_observes_kill() {
        let fx = Fixture::new();
        let gated = GatedBody::new();
        let graph = Graph::single(node("g", 0, gated.clone()));
        let mut inputs = InputMap::new();
        inputs.set("g", vec![]);

        let mut executor = fx.executor(graph, inputs);
        let controller = executor.controller().clone();
        let run = tokio::spawn(async move { executor.run().await });

        gated.started().await;
        controller.kill();
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Aborted);
        assert!(gated.finished());
    }

    #[tokio::test]
    async fn test_pause_resume_is_transparent() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let gated = GatedBody::new();
        let (graph, inputs) = chain(CountingBody::new("a"), node("b", 1, gated.clone()), CountingBody::new("c"));

        let mut executor = fx.executor(graph, inputs);
        let controller = executor.controller().clone();
        let run = tokio::spawn(async move { executor.run().await });

        // Pause while b is running; c must not be dispatched until resume.
        gated.started().await;
        controller.pause();
        gated.open();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let so_far = described(&drain(&mut stream));
        assert_eq!(so_far.last().map(String::as_str), Some("node-finish b"));

        controller.resume();
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Completed);
        let rest = described(&collect_run(&mut stream, Duration::from_secs(1)).await);
        assert_eq!(rest, vec!["node-start c", "node-finish c", "finish"]);
    }

    #[tokio::test]
    async fn test_run_single_returns_output_without_finish() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let body = CountingBody::new("solo");

        let mut executor = Executor::single(
            node("solo", 2, body.clone()),
            vec![json!(1), json!(2)],
            EventSink::new(fx.channel.clone()),
            fx.pool.clone(),
        );
        let output = executor.run_single().await.unwrap().unwrap();

        assert_eq!(output.outputs[0], json!(["solo", 1, 2]));
        assert_eq!(body.calls(), 1);
        assert_eq!(
            described(&drain(&mut stream)),
            vec!["node-start solo", "node-finish solo"]
        );
    }

    #[tokio::test]
    async fn test_missing_upstream_output_is_reported() {
        let fx = Fixture::new();
        let mut stream = fx.channel.subscribe();
        let graph = Graph::single(node("b", 1, CountingBody::new("b")));
        let mut inputs = InputMap::new();
        inputs.set(
            "b",
            vec![InputSource::Edge {
                node: NodeId::new("ghost"),
                slot: 0,
            }],
        );

        let err = fx.executor(graph, inputs).run().await.unwrap_err();
        assert!(matches!(err, GraphrunError::UnresolvedInput { .. }));
        assert_eq!(described(&drain(&mut stream)), vec!["execution-error b"]);
    }
}
