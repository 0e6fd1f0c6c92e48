use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use graphrun_core::config::AppConfig;
use graphrun_core::control::{RunController, RunState};
use graphrun_core::error::{GraphrunError, Result, ValidationError};
use graphrun_core::event::{EventChannel, EventSink};
use graphrun_core::types::{Event, EventKind, NodeId, NodeOutput};
use graphrun_nodes::NodeRegistry;

use crate::executor::{Executor, RunOutcome};
use crate::gate::ZeroGate;
use crate::graph::{Graph, InputMap, Node};
use crate::json::{parse_json, RunIndividualRequest, RunRequest};
use crate::optimize::{GraphOptimizer, PruneDeadNodes};
use crate::pool::WorkerPool;

const LOADING_NODES: &str = "Loading nodes...";

/// The one full run currently in flight.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub controller: RunController,
    pub started_at: DateTime<Utc>,
}

impl RunHandle {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            controller: RunController::new(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the backend, for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub ready: bool,
    pub active_run: Option<ActiveRun>,
    pub individual_runs: usize,
    pub cached_nodes: usize,
    pub workers: usize,
    pub available_workers: usize,
}

/// Process-wide execution context: the node registry, the event channels,
/// the worker pool, the per-node preview cache, and the single-run slot.
///
/// Constructed once at startup and shared by reference with every request
/// handler.
pub struct Backend {
    config: AppConfig,
    registry: watch::Sender<Option<Arc<NodeRegistry>>>,
    queue: Arc<EventChannel>,
    setup_queue: Arc<EventChannel>,
    pool: WorkerPool,
    cache: Mutex<HashMap<NodeId, NodeOutput>>,
    active: watch::Sender<Option<RunHandle>>,
    individual: ZeroGate,
    optimizer: Arc<dyn GraphOptimizer>,
}

/// Clears the run slot when the run that claimed it ends, however it ends.
struct SlotGuard<'a> {
    active: &'a watch::Sender<Option<RunHandle>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.active.send_replace(None);
    }
}

impl Backend {
    pub fn new(config: AppConfig) -> Self {
        let (registry, _) = watch::channel(None);
        let (active, _) = watch::channel(None);
        Self {
            pool: WorkerPool::new(config.engine.workers),
            config,
            registry,
            queue: Arc::new(EventChannel::new()),
            setup_queue: Arc::new(EventChannel::new()),
            cache: Mutex::new(HashMap::new()),
            active,
            individual: ZeroGate::new(),
            optimizer: Arc::new(PruneDeadNodes),
        }
    }

    /// Replace the pass applied to full runs that do not broadcast previews.
    pub fn with_optimizer(mut self, optimizer: impl GraphOptimizer + 'static) -> Self {
        self.optimizer = Arc::new(optimizer);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Channel carrying run events.
    pub fn queue(&self) -> &Arc<EventChannel> {
        &self.queue
    }

    /// Channel carrying startup progress.
    pub fn setup_queue(&self) -> &Arc<EventChannel> {
        &self.setup_queue
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Load the node registry, reporting progress on the setup channel, then
    /// open the ready gate.
    pub async fn setup<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<NodeRegistry>,
    {
        let timeout = self.config.engine.setup_event_timeout();
        let setup = EventSink::new(self.setup_queue.clone());

        setup.put_and_wait(Event::BackendStarted, timeout).await;
        setup
            .put_and_wait(Event::backend_status(LOADING_NODES, 0.0, None), timeout)
            .await;

        let registry = match load() {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "Failed to load nodes");
                return Err(e);
            }
        };
        info!(
            nodes = registry.len(),
            categories = registry.categories().len(),
            "Nodes loaded"
        );

        setup
            .put_and_wait(Event::backend_status(LOADING_NODES, 1.0, None), timeout)
            .await;
        setup.put_and_wait(Event::BackendReady, timeout).await;

        if self.config.events.log_events {
            self.spawn_event_logger();
        }
        self.registry.send_replace(Some(Arc::new(registry)));
        info!("Backend ready");
        Ok(())
    }

    fn spawn_event_logger(&self) {
        let mut stream = self.queue.subscribe();
        tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                debug!(event = %event.kind(), data = %event.data(), "Run event");
            }
        });
    }

    pub fn is_ready(&self) -> bool {
        self.registry.borrow().is_some()
    }

    /// The node registry, once setup has finished. Waits until then.
    pub async fn ready(&self) -> Arc<NodeRegistry> {
        let mut rx = self.registry.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(registry) = current {
                return registry;
            }
            // The sender lives as long as `self`.
            let _ = rx.changed().await;
        }
    }

    /// Run a submitted graph to completion, failure, or kill.
    ///
    /// Rejected with `AlreadyRunning` while another full run holds the slot.
    /// Waits for in-flight single-node runs before starting.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let registry = self.ready().await;

        let handle = RunHandle::new();
        let _slot = self.claim(handle.clone())?;
        let run_id = handle.run_id;

        tokio::select! {
            _ = self.individual.wait_zero() => {}
            _ = handle.controller.killed() => return Ok(self.killed(run_id)),
        }

        info!(%run_id, nodes = request.data.len(), "Running new executor");
        let (graph, inputs) = match self.prepare(&request, &registry) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(%run_id, error = %e, "Rejected graph");
                self.queue
                    .put(Event::ExecutionError(e.to_error_data("Error running nodes!")));
                return Err(e);
            }
        };

        let parent = Arc::new(self.cache.lock().unwrap().clone());
        let mut executor = Executor::new(
            graph,
            inputs,
            EventSink::new(self.queue.clone()),
            self.pool.clone(),
        )
        .with_parent_cache(parent)
        .with_controller(handle.controller.clone())
        .with_options(request.options)
        .with_broadcast(request.send_broadcast_data)
        .with_kill_grace(self.config.engine.kill_grace());

        match executor.run().await? {
            RunOutcome::Completed => Ok(RunOutcome::Completed),
            RunOutcome::Aborted => Ok(self.killed(run_id)),
        }
    }

    fn claim(&self, handle: RunHandle) -> Result<SlotGuard<'_>> {
        let claimed = self.active.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(handle);
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!("{}", GraphrunError::AlreadyRunning);
            return Err(GraphrunError::AlreadyRunning);
        }
        Ok(SlotGuard {
            active: &self.active,
        })
    }

    fn prepare(&self, request: &RunRequest, registry: &NodeRegistry) -> Result<(Graph, InputMap)> {
        let (graph, inputs) = parse_json(&request.data, registry)?;
        if self.config.engine.optimize && !request.send_broadcast_data {
            let before = graph.len();
            let graph = self.optimizer.optimize(graph)?;
            debug!(before, after = graph.len(), "Optimized graph");
            return Ok((graph, inputs));
        }
        Ok((graph, inputs))
    }

    fn killed(&self, run_id: Uuid) -> RunOutcome {
        info!(%run_id, "Execution was killed");
        self.queue.put(Event::finish("Execution was killed."));
        RunOutcome::Aborted
    }

    /// Run one node in isolation for a preview and keep its output in the
    /// per-node cache. Only `node-finish` and `execution-error` reach the run
    /// channel.
    ///
    /// Returns `None` if the node was aborted.
    pub async fn run_individual(&self, request: RunIndividualRequest) -> Result<Option<NodeOutput>> {
        let registry = self.ready().await;
        self.cache.lock().unwrap().remove(&request.id);

        let registered = registry.resolve(&request.schema_id)?;
        let expected = registered.schema.input_count();
        let given = request.inputs.len();
        if given < expected {
            return Err(ValidationError::UnresolvedInput {
                node_id: request.id,
                slot: given,
            }
            .into());
        }
        if given > expected {
            return Err(ValidationError::InputOutOfRange {
                node_id: request.id,
                slot: expected,
                available: expected,
            }
            .into());
        }

        let node = Node::from_registered(request.id.clone(), registered);
        let events = EventSink::filtered(
            self.queue.clone(),
            [EventKind::NodeFinish, EventKind::ExecutionError],
        );

        let _running = self.individual.enter();
        debug!(node_id = %request.id, schema_id = %request.schema_id, "Running individual node");
        let mut executor = Executor::single(node, request.inputs, events, self.pool.clone())
            .with_options(request.options)
            .with_broadcast(true);
        let output = executor.run_single().await?;

        if let Some(output) = &output {
            self.cache
                .lock()
                .unwrap()
                .insert(request.id, output.clone());
        }
        Ok(output)
    }

    /// Evict one node from the per-node cache. Returns whether it was cached.
    pub async fn clear_cache_individual(&self, id: &NodeId) -> bool {
        self.ready().await;
        self.cache.lock().unwrap().remove(id).is_some()
    }

    /// Snapshot of the per-node cache.
    pub fn cached(&self, id: &NodeId) -> Option<NodeOutput> {
        self.cache.lock().unwrap().get(id).cloned()
    }

    pub fn active_run(&self) -> Option<RunHandle> {
        self.active.borrow().clone()
    }

    fn require_active(&self, action: &'static str) -> Result<RunHandle> {
        self.active_run().ok_or_else(|| {
            warn!("No executor to {}", action);
            GraphrunError::NoActiveRun(action)
        })
    }

    pub async fn pause(&self) -> Result<()> {
        self.ready().await;
        let handle = self.require_active("pause")?;
        info!(run_id = %handle.run_id, "Executor found. Pausing");
        handle.controller.pause();
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.ready().await;
        let handle = self.require_active("resume")?;
        info!(run_id = %handle.run_id, "Executor found. Resuming");
        handle.controller.resume();
        Ok(())
    }

    /// Kill the active run and wait until it has released the run slot.
    pub async fn kill(&self) -> Result<()> {
        self.ready().await;
        let handle = self.require_active("kill")?;
        info!(run_id = %handle.run_id, "Executor found. Killing");
        handle.controller.kill();

        let mut rx = self.active.subscribe();
        let _ = rx
            .wait_for(|slot| slot.as_ref().map_or(true, |h| h.run_id != handle.run_id))
            .await;
        Ok(())
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            ready: self.is_ready(),
            active_run: self.active_run().map(|h| ActiveRun {
                run_id: h.run_id,
                state: h.controller.state(),
                started_at: h.started_at,
            }),
            individual_runs: self.individual.count(),
            cached_nodes: self.cache.lock().unwrap().len(),
            workers: self.pool.size(),
            available_workers: self.pool.available(),
        }
    }
}
