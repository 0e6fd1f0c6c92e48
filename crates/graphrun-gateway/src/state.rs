use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use graphrun_engine::Backend;

/// Shared application state for axum handlers.
pub struct AppState {
    pub backend: Arc<Backend>,
    /// Ends open event streams so graceful shutdown can complete.
    pub shutdown: CancellationToken,
}
