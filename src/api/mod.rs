//! HTTP API server for voxloop

pub mod conversation;
pub mod health;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::session::SessionId;
use crate::turn::Orchestrator;
use crate::Result;

/// Shared state for API handlers
///
/// The mutex is the request queue: one turn (or reset, greeting, sweep) at a time.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Mutex<Orchestrator>>,
    pub session: SessionId,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    orchestrator: Orchestrator,
    port: u16,
    static_dir: Option<PathBuf>,
    sweep_interval: Option<Duration>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            port: 5000,
            static_dir: None,
            sweep_interval: None,
        }
    }

    /// Set the listen port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Serve a front-end from this directory
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Sweep published audio periodically
    #[must_use]
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let public_dir = self.orchestrator.publisher().dir().to_path_buf();
        let url_prefix = self.orchestrator.publisher().url_prefix().to_string();

        ApiServer {
            state: ApiState {
                orchestrator: Arc::new(Mutex::new(self.orchestrator)),
                session: SessionId::default_session(),
            },
            port: self.port,
            static_dir: self.static_dir,
            public_dir,
            url_prefix,
            sweep_interval: self.sweep_interval,
        }
    }
}

/// API server
pub struct ApiServer {
    state: ApiState,
    port: u16,
    static_dir: Option<PathBuf>,
    public_dir: PathBuf,
    url_prefix: String,
    sweep_interval: Option<Duration>,
}

impl ApiServer {
    #[must_use]
    pub fn state(&self) -> &ApiState {
        &self.state
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(conversation::router(self.state.clone()))
            .merge(health::router())
            .nest_service(&self.url_prefix, ServeDir::new(&self.public_dir));

        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if let Some(interval) = self.sweep_interval {
            spawn_sweeper(Arc::clone(&self.state.orchestrator), interval);
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            audio = %self.url_prefix,
            "API server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// Sweep published audio every `interval`, waiting out any turn in progress
fn spawn_sweeper(orchestrator: Arc<Mutex<Orchestrator>>, interval: Duration) {
    tracing::info!(interval_secs = interval.as_secs(), "periodic audio sweep enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; startup already swept
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let orchestrator = orchestrator.lock().await;
            if let Err(e) = orchestrator.sweep() {
                tracing::warn!(error = %e, "periodic sweep failed");
            }
        }
    });
}
