//! Preview HTTP server with axum router and graceful shutdown.

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{get_events_sse, get_status, post_start, post_stop, put_files, AppState};
use crate::config::ServerConfig;
use crate::supervisor::ProcessSupervisor;

/// HTTP front end for a [`ProcessSupervisor`].
#[derive(Debug)]
pub struct PreviewServer {
    /// Server configuration.
    config: ServerConfig,
    /// Application state shared across handlers.
    state: AppState,
    /// Triggers graceful shutdown when cancelled.
    cancel: CancellationToken,
}

impl PreviewServer {
    /// Create a new server with default configuration.
    #[must_use]
    pub fn new(supervisor: ProcessSupervisor, cancel: CancellationToken) -> Self {
        Self {
            config: ServerConfig::default(),
            state: AppState::new(supervisor),
            cancel,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/projects/:id/start", post(post_start))
            .route("/api/projects/:id/stop", post(post_stop))
            .route("/api/projects/:id/files", put(put_files))
            .route("/api/projects/:id/status", get(get_status))
            .route("/api/projects/:id/events", get(get_events_sse))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server, binding to the configured address.
    ///
    /// The server will run until the cancellation token is triggered,
    /// at which point it will perform a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or serve.
    pub async fn run(self) -> Result<(), ServerError> {
        let address = self.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::BindError {
                address: address.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let cancel = self.cancel.clone();
        let app = self.build_router();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Starting preview server");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Preview server shutting down gracefully");
            })
            .await
            .map_err(ServerError::ServeError)
    }
}
