pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use control::{RunController, RunState};
pub use error::{GraphrunError, NodeError, NodeExecutionError, Result, ValidationError};
pub use event::{EventChannel, EventSink, EventStream};
pub use traits::{NodeBody, NodeContext};
pub use types::*;
