pub mod backend;
pub mod cache;
pub mod executor;
pub mod gate;
pub mod graph;
pub mod json;
pub mod optimize;
pub mod pool;

pub use backend::{Backend, BackendStatus, RunHandle};
pub use cache::{CacheEntry, CacheSnapshot, OutputCache, Provenance};
pub use executor::{Executor, RunOutcome};
pub use gate::ZeroGate;
pub use graph::{Edge, Graph, InputMap, InputSource, Node};
pub use json::{parse_json, ClearCacheRequest, JsonInput, JsonNode, RunIndividualRequest, RunRequest};
pub use optimize::{GraphOptimizer, NoopOptimizer, PruneDeadNodes};
pub use pool::WorkerPool;
