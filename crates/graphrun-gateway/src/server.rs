use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use graphrun_core::error::Result;
use graphrun_engine::Backend;
use graphrun_nodes::NodeRegistry;

use crate::routes;
use crate::state::AppState;

/// Produces the node registry during backend setup.
pub type RegistryLoader = Arc<dyn Fn() -> Result<NodeRegistry> + Send + Sync>;

/// Every endpoint, wired to `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Runs
        .route("/run", post(routes::run))
        .route("/run/individual", post(routes::run_individual))
        .route("/clear-cache/individual", post(routes::clear_cache_individual))
        // Control
        .route("/pause", post(routes::pause))
        .route("/resume", post(routes::resume))
        .route("/kill", post(routes::kill))
        // Event streams
        .route("/sse", get(routes::sse))
        .route("/setup-sse", get(routes::setup_sse))
        // Catalogue
        .route("/nodes", get(routes::nodes))
        .route("/api/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP + server-sent events front end built on axum.
pub struct GatewayServer {
    backend: Arc<Backend>,
    loader: RegistryLoader,
}

impl GatewayServer {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            loader: Arc::new(|| Ok(NodeRegistry::with_builtins())),
        }
    }

    pub fn with_loader(
        mut self,
        loader: impl Fn() -> Result<NodeRegistry> + Send + Sync + 'static,
    ) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Serve until the cancellation token is triggered.
    ///
    /// Backend setup runs in the background once the listener is bound, so
    /// clients can follow it on `/setup-sse`; other endpoints wait for it.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let server = self.backend.config().server.clone();
        let state = Arc::new(AppState {
            backend: self.backend.clone(),
            shutdown: shutdown.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&server.bind).await?;
        info!(bind = %server.bind, "Gateway listening");

        self.spawn_setup(shutdown.clone(), server.close_after_start);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }

    fn spawn_setup(&self, shutdown: CancellationToken, close_after_start: bool) {
        let backend = self.backend.clone();
        let loader = self.loader.clone();
        tokio::spawn(async move {
            match backend.setup(|| loader()).await {
                Ok(()) if close_after_start => {
                    info!("Setup finished, closing as configured");
                    shutdown.cancel();
                }
                Ok(()) => {}
                Err(e) => {
                    error!(error = %e, "Backend setup failed, shutting down");
                    shutdown.cancel();
                }
            }
        });
    }
}
